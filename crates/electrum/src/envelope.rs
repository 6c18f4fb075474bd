//! Wire envelopes for newline-delimited JSON-RPC frames.

use crate::error::{ElectrumError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound request frame
#[derive(Debug, Serialize)]
pub(crate) struct RequestEnvelope<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
}

impl RequestEnvelope<'_> {
    /// Serialize as a single line terminated by `\n`
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self).map_err(|e| ElectrumError::Encode {
            method: self.method.to_string(),
            message: e.to_string(),
        })?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Error object carried in a reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteErrorBody {
    pub code: i64,
    pub message: String,
}

/// Any inbound frame: a reply, a server push, or both
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Frame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteErrorBody>,
}

impl Frame {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| ElectrumError::Decode {
            context: "frame".to_string(),
            message: e.to_string(),
        })
    }

    /// Payload delivered to subscribers of a push
    pub fn push_payload(&self) -> Value {
        self.params
            .clone()
            .or_else(|| self.result.clone())
            .unwrap_or(Value::Null)
    }

    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(ElectrumError::RemoteError {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Server-initiated push, delivered to every subscriber of its method
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_line() {
        let params = [json!("abc"), json!(1)];
        let line = RequestEnvelope {
            id: 7,
            method: "blockchain.scripthash.get_balance",
            params: &params,
        }
        .to_line()
        .unwrap();

        assert_eq!(line.last(), Some(&b'\n'));
        let parsed: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["method"], "blockchain.scripthash.get_balance");
        assert_eq!(parsed["params"], json!(["abc", 1]));
    }

    #[test]
    fn test_reply_with_error() {
        let frame =
            Frame::parse(r#"{"jsonrpc":"2.0","id":3,"error":{"code":-1,"message":"nope"}}"#)
                .unwrap();
        assert_eq!(frame.id, Some(3));
        assert_eq!(
            frame.into_result(),
            Err(ElectrumError::RemoteError {
                code: -1,
                message: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_push_frame() {
        let frame = Frame::parse(
            r#"{"jsonrpc":"2.0","method":"blockchain.headers.subscribe","params":[{"height":1}]}"#,
        )
        .unwrap();
        assert!(frame.id.is_none());
        assert_eq!(frame.push_payload(), json!([{"height": 1}]));
    }

    #[test]
    fn test_null_result_is_not_an_error() {
        let frame = Frame::parse(r#"{"id":1,"result":null}"#).unwrap();
        assert_eq!(frame.into_result(), Ok(Value::Null));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            Frame::parse("not json"),
            Err(ElectrumError::Decode { .. })
        ));
    }
}
