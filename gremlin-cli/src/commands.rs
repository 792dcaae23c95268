//! Query execution and output formatting.

use colored::Colorize;
use gremlin_client::Conn;
use gremlin_protocol::{Request, Response};
use serde_json::{Map, Value};

/// Evaluates a query, with optional bindings, and returns the final response.
pub async fn eval(
    conn: &Conn,
    query: &str,
    bindings: Option<&str>,
) -> Result<Response, Box<dyn std::error::Error>> {
    let request = match bindings {
        Some(arg) => Request::eval_with_bindings(query, parse_bindings(arg)?),
        None => Request::eval(query),
    };
    Ok(conn.execute(&request).await?)
}

/// Formats a response: status line, then data (or the error message).
pub fn format_response(rsp: &Response) -> String {
    if let Some(err) = rsp.err() {
        return format!("{}: {}", "Error".red(), err);
    }

    let status = rsp.status.code.to_string().green();
    match rsp.decode::<Value>() {
        Ok(Some(data)) => format!("{}\n{}", status, format_json(&data)),
        Ok(None) => status.to_string(),
        Err(e) => format!("{} (undecodable data: {})", status, e),
    }
}

/// Parses a bindings argument (either inline JSON or @file.json).
pub fn parse_bindings(arg: &str) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let value: Value = if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        serde_json::from_str(arg)?
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err("bindings must be a JSON object".into()),
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
