//! Mount argument normalizer (§4.3): a value type for the argument vector passed to the mount
//! binary inside a Mounter Pod.

use std::collections::BTreeMap;

/// Long-form flags the driver never passes through, because they conflict with the runner's own
/// handling of foregrounding, help, and version output.
const DROPPED_FLAGS: &[&str] = &["--foreground", "--help", "--version"];
/// Short-form equivalents of [`DROPPED_FLAGS`].
const DROPPED_SHORT_FLAGS: &[&str] = &["-f", "-h", "-v"];

/// Keys the driver owns the semantics of and therefore never lets a caller override.
///
/// Rejection here is silent — the node-service is responsible for validating user-facing input
/// and producing a user-visible error if one of these was requested.
const STRIP_LIST: &[&str] = &[
    "--endpoint-url",
    "--profile",
    "--storage-class",
    "--force-path-style",
];

/// An unordered set of `(key, optional value)` pairs destined for the mount binary's argv.
///
/// `Args` is a plain owned value: cloning it and handing the clone to the Pod Spec Builder never
/// lets the builder observe (or cause) mutation of the caller's copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    entries: BTreeMap<String, Option<String>>,
}

/// Normalize a raw key into its canonical `--foo` form.
///
/// `--foo`, `-foo`, and `foo` all canonicalize to `--foo`.
fn normalize_key(key: &str) -> String {
    let trimmed = key.trim();
    let bare = trimmed.trim_start_matches('-');
    format!("--{bare}")
}

impl Args {
    /// An empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a vector of raw tokens, each of which may be `--k=v`, `--k v`, or a bare `--k`.
    ///
    /// Tokens for flags the driver doesn't accept (`--foreground`/`-f`, `--help`/`-h`,
    /// `--version`/`-v`) are dropped silently, as are tokens whose key is on the policy
    /// strip-list. Whitespace around tokens is trimmed.
    #[must_use]
    pub fn parse<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = Self::new();
        for raw in tokens {
            let token = raw.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            let (raw_key, raw_value) = match token.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim().to_owned())),
                None => match token.split_once(' ') {
                    Some((k, v)) => (k.trim(), Some(v.trim().to_owned())),
                    None => (token, None),
                },
            };
            if Self::is_rejected(raw_key) {
                continue;
            }
            let key = normalize_key(raw_key);
            if STRIP_LIST.contains(&key.as_str()) {
                continue;
            }
            let _previous = args.entries.insert(key, raw_value);
        }
        args
    }

    /// Whether a raw (pre-normalization) key is one of the dropped foreground/help/version flags.
    fn is_rejected(raw_key: &str) -> bool {
        let normalized = normalize_key(raw_key);
        DROPPED_FLAGS.contains(&normalized.as_str()) || DROPPED_SHORT_FLAGS.contains(&raw_key)
    }

    /// Insert or overwrite `key`, unconditionally.
    ///
    /// `key` is normalized; if it is on the policy strip-list it is silently ignored.
    pub fn insert(&mut self, key: &str, value: Option<String>) {
        let key = normalize_key(key);
        if STRIP_LIST.contains(&key.as_str()) {
            return;
        }
        let _previous = self.entries.insert(key, value);
    }

    /// Insert `key` only if it is not already present.
    pub fn set_if_absent(&mut self, key: &str, value: Option<String>) {
        let key = normalize_key(key);
        if STRIP_LIST.contains(&key.as_str()) {
            return;
        }
        let _ = self.entries.entry(key).or_insert(value);
    }

    /// Remove `key`, if present.
    pub fn remove(&mut self, key: &str) {
        let key = normalize_key(key);
        let _removed = self.entries.remove(&key);
    }

    /// The value associated with `key`, if it is present and has a value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.entries.get(&key).and_then(|v| v.as_deref())
    }

    /// Whether `key` is present, with or without a value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.entries.contains_key(&key)
    }

    /// Render every entry as `--k=v` or bare `--k`, sorted lexicographically.
    ///
    /// Deterministic: the same set of entries always yields the same output, which keeps
    /// generated Mounter-Pod specs stable and comparable across reconciles.
    #[must_use]
    pub fn sorted_list(&self) -> Vec<String> {
        let mut rendered: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| match v {
                Some(value) => format!("{k}={value}"),
                None => k.clone(),
            })
            .collect();
        rendered.sort();
        rendered
    }
}

#[cfg(test)]
mod test {
    use super::Args;

    #[test]
    fn key_normalization_converges() {
        let mut a = Args::new();
        a.insert("foo", Some("1".to_owned()));
        let mut b = Args::new();
        b.insert("-foo", Some("1".to_owned()));
        let mut c = Args::new();
        c.insert("--foo", Some("1".to_owned()));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn parse_dedupes_equivalent_forms() {
        let args = Args::parse(["--cache=/tmp", "cache /tmp"]);
        assert_eq!(args.sorted_list(), vec!["--cache=/tmp".to_owned()]);
    }

    #[test]
    fn parse_strips_policy_owned_keys() {
        let args = Args::parse(["--endpoint-url=https://example.com"]);
        assert!(!args.has("--endpoint-url"));
        assert!(args.sorted_list().is_empty());
    }

    #[test]
    fn parse_drops_conflicting_runner_flags() {
        let args = Args::parse(["--foreground", "-f", "-h", "--help", "-v", "--version"]);
        assert!(args.sorted_list().is_empty());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = Args::parse(["--cache=/tmp", "--debug"]);
        let twice = Args::parse(once.sorted_list());
        assert_eq!(once, twice);
    }

    #[test]
    fn sorted_list_is_deterministic() {
        let mut a = Args::new();
        a.insert("zeta", None);
        a.insert("alpha", Some("1".to_owned()));
        let mut b = Args::new();
        b.insert("alpha", Some("1".to_owned()));
        b.insert("zeta", None);
        assert_eq!(a.sorted_list(), b.sorted_list());
        assert_eq!(a.sorted_list(), vec!["--alpha=1".to_owned(), "--zeta".to_owned()]);
    }

    #[test]
    fn set_if_absent_does_not_overwrite() {
        let mut a = Args::new();
        a.insert("cache", Some("/tmp".to_owned()));
        a.set_if_absent("cache", Some("/var".to_owned()));
        assert_eq!(a.value("cache"), Some("/tmp"));
    }

    #[test]
    fn remove_drops_the_entry() {
        let mut a = Args::new();
        a.insert("debug", None);
        assert!(a.has("debug"));
        a.remove("debug");
        assert!(!a.has("debug"));
    }
}
