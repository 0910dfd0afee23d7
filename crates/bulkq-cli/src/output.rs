//! Rendering an aggregate result

use std::io::Write;

use anyhow::Result;
use bulkq_core::Value;
use bulkq_query::AggregateResult;
use clap::ValueEnum;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Write `aggregate` to `out`.
///
/// Table and CSV output leave messages to the caller; JSON embeds them.
pub fn render(aggregate: &AggregateResult, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Table => render_table(aggregate, out),
        OutputFormat::Json => render_json(aggregate, out),
        OutputFormat::Csv => render_csv(aggregate, out),
    }
}

fn render_table(aggregate: &AggregateResult, out: &mut impl Write) -> Result<()> {
    let Some(schema) = &aggregate.schema else {
        writeln!(out, "(no result)")?;
        return Ok(());
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(schema.iter().map(|c| c.name.as_str()));
    for row in &aggregate.rows {
        table.add_row(row.values.iter().map(Value::to_string));
    }

    writeln!(out, "{table}")?;
    let count = aggregate.row_count();
    writeln!(out, "({} row{})", count, if count == 1 { "" } else { "s" })?;
    Ok(())
}

fn render_json(aggregate: &AggregateResult, out: &mut impl Write) -> Result<()> {
    let rows: Vec<serde_json::Value> = aggregate
        .rows
        .iter()
        .map(|row| row.values.iter().map(Value::to_json).collect())
        .collect();

    let document = serde_json::json!({
        "columns": aggregate.schema,
        "rows": rows,
        "messages": aggregate.messages,
    });
    serde_json::to_writer_pretty(&mut *out, &document)?;
    writeln!(out)?;
    Ok(())
}

fn render_csv(aggregate: &AggregateResult, out: &mut impl Write) -> Result<()> {
    let Some(schema) = &aggregate.schema else {
        return Ok(());
    };

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(schema.iter().map(|c| c.name.as_str()))?;
    for row in &aggregate.rows {
        writer.write_record(row.values.iter().map(|v| match v {
            Value::Null => String::new(),
            other => other.to_string(),
        }))?;
    }
    writer.flush()?;
    Ok(())
}
