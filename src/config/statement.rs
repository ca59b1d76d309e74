use super::definition::StatementKind;
use crate::cache::{CacheKey, CacheModel};
use crate::core::Value;
use crate::mapping::{ParameterMap, ResultMap};
use std::sync::Arc;

/// A statement with every reference resolved.
#[derive(Debug)]
pub struct MappedStatement {
    pub id: String,
    pub kind: StatementKind,
    /// SQL as sent to the driver, with `?` placeholders.
    pub sql: String,
    pub parameter_map: Arc<ParameterMap>,
    pub result_map: Option<Arc<ResultMap>>,
    pub cache_model: Option<Arc<CacheModel>>,
    /// Distinguishes configurations loaded in the same process. Stripped
    /// again before a key reaches a shared backend.
    pub(crate) instance_tag: u64,
}

impl MappedStatement {
    /// Key of one execution: id, instance tag, SQL, bound values and the
    /// page window when one is requested.
    pub fn cache_key(&self, values: &[Value], skip: usize, max: Option<usize>) -> CacheKey {
        let mut key = CacheKey::new();
        key.update_str(&self.id)
            .update_instance_tag(self.instance_tag)
            .update_str(&self.sql);
        self.parameter_map.extend_key(&mut key, values);
        if skip > 0 || max.is_some() {
            key.update_str(&format!("skip:{}", skip))
                .update_str(&format!("max:{}", max.map_or(-1, |m| m as i64)));
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend_key;

    fn statement(tag: u64) -> MappedStatement {
        named("Orders.find", tag)
    }

    fn named(id: &str, tag: u64) -> MappedStatement {
        MappedStatement {
            id: id.to_string(),
            kind: StatementKind::Select,
            sql: "SELECT * FROM orders WHERE id = ?".to_string(),
            parameter_map: Arc::new(ParameterMap::new("Orders.find-Inline", Vec::new())),
            result_map: None,
            cache_model: None,
            instance_tag: tag,
        }
    }

    #[test]
    fn test_instance_tag_is_canonicalized_away() {
        let values = [Value::Integer(7)];
        let a = statement(1).cache_key(&values, 0, None);
        let b = statement(2).cache_key(&values, 0, None);
        assert_ne!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_page_window_changes_key() {
        let s = statement(1);
        let values = [Value::Integer(7)];
        assert_ne!(s.cache_key(&values, 0, None), s.cache_key(&values, 0, Some(10)));
        assert_ne!(s.cache_key(&values, 5, Some(10)), s.cache_key(&values, 0, Some(10)));
        assert_eq!(s.cache_key(&values, 5, Some(10)), s.cache_key(&values, 5, Some(10)));
    }

    #[test]
    fn test_page_window_survives_canonicalization() {
        let values = [Value::Float(1.5)];
        let five = statement(1).cache_key(&values, 5, None);
        let six = statement(2).cache_key(&values, 6, None);
        assert_ne!(five.canonical(), six.canonical());

        let other_instance = statement(3).cache_key(&values, 5, None);
        assert_eq!(five.canonical(), other_instance.canonical());
    }

    #[test]
    fn test_tag_is_dropped_for_any_statement_id() {
        let values = [Value::Integer(7)];
        for id in ["findAll", "Orders.find-all", "Orders.find"] {
            let a = named(id, 11).cache_key(&values, 0, None);
            let b = named(id, 12).cache_key(&values, 0, None);
            assert_eq!(
                backend_key("ns", "orders", &a),
                backend_key("ns", "orders", &b),
                "{}",
                id
            );
        }
    }
}
