//! Sender mapping table — constant-time classification shortcut.
//!
//! Faxes from a mapped sender skip OCR and the classifier entirely: the
//! mapped category is the classification. Built once at startup and
//! read-only afterwards, so the pipeline shares it without locking.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct SenderMap {
    map: HashMap<String, String>,
}

impl SenderMap {
    /// Build from `(sender, category)` pairs. Returns the offending key on
    /// a duplicate — two mappings for one sender would make routing depend
    /// on configuration order.
    pub fn new(pairs: Vec<(String, String)>) -> Result<Self, String> {
        let mut map = HashMap::with_capacity(pairs.len());
        for (sender, category) in pairs {
            if map.insert(sender.clone(), category).is_some() {
                return Err(sender);
            }
        }
        Ok(Self { map })
    }

    /// Category for a known sender, or `None` for the full pipeline path.
    pub fn lookup(&self, sender: &str) -> Option<&str> {
        if sender.is_empty() {
            return None;
        }
        self.map.get(sender).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
