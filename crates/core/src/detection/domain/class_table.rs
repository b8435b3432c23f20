use std::collections::BTreeMap;

/// Class id → label lookup supplied by the detector.
///
/// Labels are carried into `Detection::class_label` exactly as stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassTable {
    names: BTreeMap<u32, String>,
}

impl ClassTable {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(i, n)| (i as u32, n.into()))
                .collect(),
        }
    }

    /// Parses the `names` metadata that Ultralytics writes into ONNX
    /// exports, e.g. `{0: 'head-up', 1: 'head-down'}`.
    ///
    /// Returns `None` when the text is not a dictionary of that shape.
    pub fn parse_ultralytics_names(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut names = BTreeMap::new();
        let mut rest = body.trim();
        while !rest.is_empty() {
            let (key, after_key) = rest.split_once(':')?;
            let id: u32 = key.trim().parse().ok()?;
            let after_key = after_key.trim_start();
            let quote = after_key.chars().next().filter(|c| *c == '\'' || *c == '"')?;
            let value_and_rest = &after_key[1..];
            let end = value_and_rest.find(quote)?;
            names.insert(id, value_and_rest[..end].to_string());
            rest = value_and_rest[end + 1..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }
        if names.is_empty() {
            None
        } else {
            Some(Self { names })
        }
    }

    /// Label for `class_id`, or `class{id}` when the table has no entry.
    pub fn label(&self, class_id: u32) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{class_id}"))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
