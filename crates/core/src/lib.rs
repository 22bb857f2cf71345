#![forbid(unsafe_code)]

pub mod schema;

pub mod value {
    /// A scalar cell value: everything a field can hold and everything a
    /// condition operand can bind. Timestamps are unix milliseconds.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Value {
        Null,
        Text(String),
        Integer(i64),
        Bool(bool),
        Timestamp(i64),
    }

    impl Value {
        pub fn is_null(&self) -> bool {
            matches!(self, Value::Null)
        }

        pub fn type_name(&self) -> &'static str {
            match self {
                Value::Null => "null",
                Value::Text(_) => "text",
                Value::Integer(_) => "number",
                Value::Bool(_) => "boolean",
                Value::Timestamp(_) => "timestamp",
            }
        }
    }

    impl From<&str> for Value {
        fn from(value: &str) -> Self {
            Value::Text(value.to_string())
        }
    }

    impl From<String> for Value {
        fn from(value: String) -> Self {
            Value::Text(value)
        }
    }

    impl From<i64> for Value {
        fn from(value: i64) -> Self {
            Value::Integer(value)
        }
    }

    impl From<bool> for Value {
        fn from(value: bool) -> Self {
            Value::Bool(value)
        }
    }
}

pub mod permission {
    /// Authorization verdict computed upstream and attached to each
    /// invocation. Consumed exhaustively; there is no "unrecognized" state
    /// past envelope parsing.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum PermissionState {
        Granted,
        Pending,
        Denied,
    }

    impl PermissionState {
        pub fn as_str(self) -> &'static str {
            match self {
                PermissionState::Granted => "granted",
                PermissionState::Pending => "pending",
                PermissionState::Denied => "denied",
            }
        }

        pub fn from_str(value: &str) -> Option<Self> {
            match value {
                "granted" => Some(PermissionState::Granted),
                "pending" => Some(PermissionState::Pending),
                "denied" => Some(PermissionState::Denied),
                _ => None,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::PermissionState;

        #[test]
        fn round_trips_wire_strings() {
            for state in [
                PermissionState::Granted,
                PermissionState::Pending,
                PermissionState::Denied,
            ] {
                assert_eq!(PermissionState::from_str(state.as_str()), Some(state));
            }
        }

        #[test]
        fn rejects_unknown_status() {
            assert_eq!(PermissionState::from_str("maybe"), None);
            assert_eq!(PermissionState::from_str(""), None);
            assert_eq!(PermissionState::from_str("GRANTED"), None);
        }
    }
}
