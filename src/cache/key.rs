use crate::core::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

const MULTIPLIER: i64 = 37;
const SEED: i64 = 17;

/// Composite key of one statement execution.
///
/// Each component folds into a running hashcode and checksum, so two keys
/// are equal only when their component sequences are equal. The string form
/// is `hashcode|checksum|c1|c2|...` with `|` and `\` escaped inside
/// components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hashcode: i64,
    checksum: i64,
    count: i64,
    components: Vec<String>,
    /// Position of the per-configuration tag, left out of [`CacheKey::canonical`].
    instance_tag: Option<usize>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            hashcode: SEED,
            checksum: 0,
            count: 0,
            components: Vec::new(),
            instance_tag: None,
        }
    }

    pub fn update_str(&mut self, component: &str) -> &mut Self {
        self.push(component.to_string())
    }

    pub fn update_value(&mut self, value: &Value) -> &mut Self {
        self.push(value.key_repr())
    }

    pub fn update_number(&mut self, component: i64) -> &mut Self {
        self.push(component.to_string())
    }

    /// Adds the tag that tells apart configurations loaded in one process.
    /// It takes part in equality but never reaches a shared backend.
    pub fn update_instance_tag(&mut self, tag: u64) -> &mut Self {
        self.instance_tag = Some(self.components.len());
        self.push(tag.to_string())
    }

    fn push(&mut self, component: String) -> &mut Self {
        let mut base = stable_hash(&component);

        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        base = base.wrapping_mul(self.count);
        self.hashcode = MULTIPLIER.wrapping_mul(self.hashcode).wrapping_add(base);

        self.components.push(component);
        self
    }

    pub fn hashcode(&self) -> i64 {
        self.hashcode
    }

    pub fn checksum(&self) -> i64 {
        self.checksum
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Form shared by every process for the same logical query: the escaped
    /// components without the hash pair and without the instance tag.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        let kept = self
            .components
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != self.instance_tag);
        for (n, (_, component)) in kept.enumerate() {
            if n > 0 {
                out.push('|');
            }
            escape_into(&mut out, component);
        }
        out
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.hashcode, self.checksum)?;
        let mut escaped = String::new();
        for component in &self.components {
            escaped.clear();
            escape_into(&mut escaped, component);
            write!(f, "|{}", escaped)?;
        }
        Ok(())
    }
}

fn escape_into(out: &mut String, component: &str) {
    for c in component.chars() {
        if c == '|' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
}

/// FNV-1a; identical across processes, unlike `DefaultHasher`.
fn stable_hash(component: &str) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in component.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash as i64
}

/// `{namespace}:{model_id}:{digest}` for a remote backend.
pub fn backend_key(namespace: &str, model_id: &str, key: &CacheKey) -> String {
    let canonical = key.canonical();
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    let backend = format!("{}:{}:{}", namespace, model_id, digest);

    debug!(raw = %key, canonical = %canonical, key = %backend, "Derived cache key");
    backend
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[&str]) -> CacheKey {
        let mut key = CacheKey::new();
        for part in parts {
            key.update_str(part);
        }
        key
    }

    #[test]
    fn test_equal_components_equal_keys() {
        assert_eq!(key(&["a", "b"]), key(&["a", "b"]));
        assert_ne!(key(&["a", "b"]), key(&["b", "a"]));
        assert_ne!(key(&["ab"]), key(&["a", "b"]));
    }

    #[test]
    fn test_value_components_are_type_tagged() {
        let mut int_key = CacheKey::new();
        int_key.update_value(&Value::Integer(1));
        let mut text_key = CacheKey::new();
        text_key.update_value(&Value::from("1"));
        assert_ne!(int_key, text_key);
    }

    #[test]
    fn test_display_format() {
        let k = key(&["Account.find", "s:x"]);
        let shown = k.to_string();
        assert!(shown.ends_with("|Account.find|s:x"));
        assert!(shown.starts_with(&format!("{}|{}|", k.hashcode(), k.checksum())));
    }

    #[test]
    fn test_display_escapes_separators() {
        let k = key(&["a|b", "c\\"]);
        assert!(k.to_string().ends_with(r"|a\|b|c\\"));
        assert_ne!(key(&["x|s:y", "z"]).to_string(), key(&["x", "y|s:z"]).to_string());
    }

    #[test]
    fn test_canonical_drops_hash_pair_and_instance_tag() {
        let mut k = key(&["Account.find"]);
        k.update_instance_tag(987).update_value(&Value::Integer(5));
        assert_eq!(k.canonical(), "Account.find|i:5");

        let mut untagged = key(&["tenant", "Account.find"]);
        untagged.update_number(42).update_value(&Value::from("abc"));
        assert_eq!(untagged.canonical(), "tenant|Account.find|42|s:abc");
    }

    #[test]
    fn test_backend_key_ignores_instance_tag() {
        let mut first = key(&["Account.find"]);
        first.update_instance_tag(1).update_value(&Value::Integer(5));
        let mut second = key(&["Account.find"]);
        second.update_instance_tag(2).update_value(&Value::Integer(5));

        assert_ne!(first, second);
        let a = backend_key("ns", "accounts", &first);
        let b = backend_key("ns", "accounts", &second);
        assert_eq!(a, b);
        assert!(a.starts_with("ns:accounts:"));
        assert_eq!(a.len(), "ns:accounts:".len() + 64);
    }

    #[test]
    fn test_value_text_is_never_treated_as_a_tag() {
        let mut five = key(&["Orders.find"]);
        five.update_instance_tag(1).update_value(&Value::from("p|Ab.cd|5|q"));
        let mut six = key(&["Orders.find"]);
        six.update_instance_tag(1).update_value(&Value::from("p|Ab.cd|6|q"));
        assert_ne!(five.canonical(), six.canonical());
    }
}
