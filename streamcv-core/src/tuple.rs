use crate::value::Map;
use chrono::{DateTime, Utc};

/// One record flowing from a source to its sink.
#[derive(Debug, Clone)]
pub struct Tuple {
    pub data: Map,
    /// Time the tuple was produced by its source, not the time the underlying
    /// media was recorded.
    pub timestamp: DateTime<Utc>,
}

impl Tuple {
    pub fn new(data: Map) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_tuple_timestamps_are_monotonic() {
        let mut m = Map::new();
        m.insert("x".to_string(), Value::Int(1));
        let t1 = Tuple::new(m.clone());
        let t2 = Tuple::new(m);
        assert!(t2.timestamp >= t1.timestamp);
        assert_eq!(t1.data.get("x"), Some(&Value::Int(1)));
    }
}
