/// Authoritative text of the reply being streamed.
///
/// Append-only. Every non-empty append bumps [`version`](Self::version), which
/// is what the reveal timer compares against to notice it has gone stale.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    text: String,
    char_len: usize,
    version: u64,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` for an empty delta, which leaves the version alone.
    pub fn append(&mut self, delta: &str) -> bool {
        if delta.is_empty() {
            return false;
        }
        self.text.push_str(delta);
        self.char_len += delta.chars().count();
        self.version += 1;
        true
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in chars.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn appends_concatenate_in_order_and_bump_version() {
        let mut acc = MessageAccumulator::new();
        let deltas = ["Hel", "lo ", "wörld", "", "!"];
        for delta in deltas {
            acc.append(delta);
        }
        assert_eq!(acc.text(), deltas.concat());
        assert_eq!(acc.char_len(), "Hello wörld!".chars().count());
        assert_eq!(acc.version(), 4);
    }

    #[test]
    fn repeated_deltas_are_not_deduplicated() {
        let mut acc = MessageAccumulator::new();
        assert!(acc.append("ha"));
        assert!(acc.append("ha"));
        assert_eq!(acc.text(), "haha");
    }
}
