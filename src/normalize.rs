use sha2::{Digest, Sha256};

use crate::domain::PendingCategory;

/// Trim and collapse internal whitespace. Casing is preserved.
/// Returns None when nothing but whitespace is left.
pub fn clean_text(raw: &str) -> Option<String> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// `clean_text` over an optional field
pub fn clean_opt(raw: Option<&str>) -> Option<String> {
    raw.and_then(clean_text)
}

/// Comparison form: cleaned and lowercased
pub fn fold(raw: &str) -> String {
    clean_text(raw).map(|s| s.to_lowercase()).unwrap_or_default()
}

/// Case-insensitive equality after whitespace cleanup
pub fn same_text(a: &str, b: &str) -> bool {
    fold(a) == fold(b)
}

/// Identity of a moderation candidate: (category, value, region, sub-region),
/// every text part folded so that casing and spacing never split duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub category: PendingCategory,
    pub value: String,
    pub region: String,
    pub sub_region: String,
}

impl DedupKey {
    pub fn new(
        category: PendingCategory,
        value: &str,
        region: Option<&str>,
        sub_region: Option<&str>,
    ) -> Self {
        Self {
            category,
            value: fold(value),
            region: region.map(fold).unwrap_or_default(),
            sub_region: sub_region.map(fold).unwrap_or_default(),
        }
    }

    /// Stable SHA-256 hex digest used as the storage-level unique key
    pub fn fingerprint(&self) -> String {
        let mut s = String::new();
        s.push_str(self.category.as_str());
        s.push('|');
        s.push_str(&self.value);
        s.push('|');
        s.push_str(&self.region);
        s.push('|');
        s.push_str(&self.sub_region);

        let mut hasher = Sha256::new();
        hasher.update(s.as_bytes());
        hex::encode(hasher.finalize())
    }
}
