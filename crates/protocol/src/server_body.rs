//! Server body: `server=<encoded server parameter>`.
//!
//! Carries no signature. Server authenticity comes from the transport.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::encoding::{split_key_value, FIELD_SEPARATOR};
use crate::error::{ProtocolError, Result};
use crate::server_param::ServerParameter;

/// Top-level field carrying the server parameter.
pub const FIELD_SERVER: &str = "server";

/// A complete server message.
#[derive(Debug, Clone)]
pub struct ServerBody {
    server_parameter: ServerParameter,
    body: String,
}

impl ServerBody {
    /// Wrap a server parameter.
    pub fn new(server_parameter: ServerParameter) -> Self {
        let encoded = server_parameter.encoded();
        Self::with_encoded(server_parameter, &encoded)
    }

    /// Wrap a parsed parameter, keeping the field value as it was received.
    fn with_encoded(server_parameter: ServerParameter, encoded: &str) -> Self {
        Self {
            server_parameter,
            body: format!("{FIELD_SERVER}={encoded}"),
        }
    }

    pub fn server_parameter(&self) -> &ServerParameter {
        &self.server_parameter
    }

    /// The flattened wire body.
    pub fn encoded(&self) -> &str {
        &self.body
    }
}

impl PartialEq for ServerBody {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Eq for ServerBody {}

impl Hash for ServerBody {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.body.hash(state);
    }
}

impl fmt::Display for ServerBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

/// Parser for a received [`ServerBody`].
#[derive(Debug, Clone, Default)]
pub struct ServerBodyParser {
    fields: HashMap<String, String>,
}

impl ServerBodyParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the fields of a flattened `a=b&c=d` body.
    pub fn from_body(self, body: &str) -> Result<Self> {
        Ok(self.from_fields(split_key_value(body, FIELD_SEPARATOR)?))
    }

    /// Use already split top-level fields, e.g. decoded form parameters.
    pub fn from_fields(mut self, fields: HashMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    /// Parse the `server` field.
    pub fn parsed(&self) -> Result<ServerBody> {
        let encoded = self
            .fields
            .get(FIELD_SERVER)
            .ok_or_else(|| ProtocolError::protocol("missing important parameter"))?;

        let server_parameter = ServerParameter::parse_encoded(encoded)?;
        Ok(ServerBody::with_encoded(server_parameter, encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_param::TransactionFlags;

    fn sample_parameter() -> ServerParameter {
        ServerParameter::builder("5b216fa381b7769e1e88624ff685686c", TransactionFlags::IP_MATCH)
            .friendly_name("Unit Test")
            .build()
            .unwrap()
    }

    #[test]
    fn test_body_layout() {
        let parameter = sample_parameter();
        let body = ServerBody::new(parameter.clone());

        assert_eq!(body.encoded(), format!("server={}", parameter.encoded()));
        assert_eq!(body.to_string(), body.encoded());
    }

    #[test]
    fn test_parse_roundtrip() {
        let body = sample_parameter().into_server_body();

        let parsed = ServerBodyParser::new()
            .from_body(body.encoded())
            .unwrap()
            .parsed()
            .unwrap();

        assert_eq!(parsed, body);
        assert_eq!(parsed.server_parameter(), body.server_parameter());
    }

    #[test]
    fn test_parse_keeps_padded_value() {
        let encoded = format!("{}=", ServerParameter::from_uri("example.com/a?nut=xy").encoded());
        let body = format!("server={encoded}");
        let parsed = ServerBodyParser::new().from_body(&body).unwrap().parsed().unwrap();

        assert_eq!(parsed.encoded(), body);
        assert_eq!(parsed.server_parameter().nut().unwrap(), "xy");
    }

    #[test]
    fn test_parse_requires_server_field() {
        let mut fields = HashMap::new();
        fields.insert("client".to_string(), "abc".to_string());

        let err = ServerBodyParser::new().from_fields(fields).parsed().unwrap_err();
        assert!(matches!(err, ProtocolError::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let parameter = ServerParameter::builder("nut", TransactionFlags::empty())
            .version("2")
            .build()
            .unwrap();
        let err = ServerBodyParser::new()
            .from_body(ServerBody::new(parameter).encoded())
            .unwrap()
            .parsed()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Protocol(_)));
    }
}
