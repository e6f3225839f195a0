//! Request encoding, response decoding and failure classification.

use crate::error::{Error, Result};
use crate::rpc::Dialect;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

/// A JSON-RPC 1.1 request object as understood by the mainchain daemon.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    /// Protocol version tag.
    pub version: &'static str,
    /// Fully qualified method name.
    pub method: &'a str,
    /// Positional parameters.
    pub params: &'a [Value],
    /// Request id.
    pub id: u64,
}

impl<'a> JsonRpcRequest<'a> {
    /// Build a request.
    #[must_use]
    pub fn new(method: &'a str, params: &'a [Value], id: u64) -> Self {
        Self {
            version: "1.1",
            method,
            params,
            id,
        }
    }
}

/// Method name on the wire, derived from namespace segments plus the method.
///
/// JSON-RPC joins segments with `.`; REST joins them with `/` and maps every
/// `_` to `/`, so `wallet_transfer` becomes `/wallet/transfer`.
#[must_use]
pub fn wire_method(dialect: Dialect, namespace: &[String], method: &str) -> String {
    let segments = namespace.iter().map(String::as_str).chain(std::iter::once(method));
    match dialect {
        Dialect::JsonRpc => segments
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("."),
        Dialect::Rest => {
            let joined = segments
                .filter(|s| !s.is_empty())
                .map(|s| s.replace('_', "/"))
                .collect::<Vec<_>>()
                .join("/");
            format!("/{joined}")
        }
    }
}

/// Body for a REST call: the first argument, JSON strings sent verbatim.
///
/// # Errors
///
/// Returns `Error::Config` if more than one argument is given.
pub fn rest_body(method: &str, params: &[Value]) -> Result<Option<String>> {
    match params {
        [] => Ok(None),
        [Value::String(raw)] => Ok(Some(raw.clone())),
        [value] => Ok(Some(serde_json::to_string(value)?)),
        _ => Err(Error::Config(format!(
            "{method}: REST calls take a single body argument, got {}",
            params.len()
        ))),
    }
}

/// Decode a JSON-RPC reply.
///
/// A non-null `error` member wins over the status code; a non-200 reply
/// without a parseable error is surfaced with its raw body.
///
/// # Errors
///
/// Returns `Error::Api` for error replies, malformed payloads and missing results.
pub fn decode_json_rpc(method: &str, status: u16, body: &str) -> Result<Value> {
    let api_error = |payload: String| Error::Api {
        method: method.to_string(),
        status: Some(status),
        payload,
    };

    let Ok(Value::Object(mut response)) = serde_json::from_str::<Value>(body) else {
        return Err(api_error(body.to_string()));
    };

    if let Some(err) = response.remove("error").filter(|e| !e.is_null()) {
        return Err(api_error(err.to_string()));
    }
    if status != 200 {
        return Err(api_error(body.to_string()));
    }
    response
        .remove("result")
        .ok_or_else(|| api_error("missing JSON-RPC result".to_string()))
}

/// Decode a REST reply: any status other than 200 is an API error.
///
/// # Errors
///
/// Returns `Error::Api` for non-200 replies and malformed payloads.
pub fn decode_rest(method: &str, status: u16, body: &str) -> Result<Value> {
    let api_error = |payload: String| Error::Api {
        method: method.to_string(),
        status: Some(status),
        payload,
    };
    if status != 200 {
        return Err(api_error(body.to_string()));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|_| api_error(body.to_string()))
}

/// Whether a transport failure is a peer disconnect that warrants a reconnect.
///
/// Covers connection reset, broken pipe, aborted connections, unexpected EOF
/// and a connection closed before any status line was received.
#[must_use]
pub fn is_disconnect(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return false;
    }
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(h) = e.downcast_ref::<hyper::Error>() {
            if h.is_incomplete_message() || h.is_canceled() {
                return true;
            }
        }
        source = e.source();
    }
    false
}

/// Decode a currency amount without going through floating point.
///
/// # Errors
///
/// Returns `Error::Serialization` if the value is not a decimal number.
pub fn decode_amount(value: &Value) -> Result<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(Error::Serialization(format!(
                "expected a decimal amount, got {other}"
            )))
        }
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| Error::Serialization(format!("invalid amount {text}: {e}")))
}

/// Encode an amount as an exact JSON number.
///
/// # Errors
///
/// Returns `Error::Serialization` if the amount cannot be represented.
pub fn encode_amount(amount: Decimal) -> Result<Value> {
    Ok(serde_json::from_str(&amount.normalize().to_string())?)
}
