//! HTML dump page for `GET /`.

use std::fmt::Write as FmtWrite;

use crate::model::MetricRecord;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn html_header(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }}
        .container {{ max-width: 1000px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        h1 {{ color: #333; border-bottom: 3px solid #007bff; padding-bottom: 10px; }}
        table {{ border-collapse: collapse; width: 100%; margin: 20px 0; }}
        th {{ background: #007bff; color: white; padding: 12px; text-align: left; font-weight: 600; }}
        td {{ padding: 10px; border-bottom: 1px solid #ddd; font-family: 'Courier New', monospace; }}
        tr:hover {{ background: #f8f9fa; }}
    </style>
</head>
<body>
<div class="container">
"#
    )
}

/// Renders all records as one table, one row per metric id.
pub fn metrics_page(records: &[MetricRecord]) -> String {
    let mut html = html_header("Metrics");
    let _ = writeln!(html, "<h1>Metrics ({})</h1>", records.len());
    html.push_str("<table>\n<tr><th>Name</th><th>Gauge</th><th>Counter</th></tr>\n");
    for record in records {
        let gauge = record.gauge.map(|v| v.to_string()).unwrap_or_default();
        let counter = record.counter.map(|v| v.to_string()).unwrap_or_default();
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&record.id),
            gauge,
            counter
        );
    }
    html.push_str("</table>\n</div>\n</body>\n</html>\n");
    html
}
