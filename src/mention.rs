//! `@name.ext` file mentions.
//!
//! A prompt may reference workspace files by bare name. Each mention is
//! looked up in the [`FileIndex`]:
//!
//! ```text
//! unknown name      -> left alone, plain text
//! one location      -> content injected once per turn, `@` stripped
//! several locations -> the user is asked which one (numbered list)
//! ```
//!
//! Only the first ambiguous mention is surfaced; the others are seen again
//! when the corrected prompt is re-scanned after the user answers.

use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::ChatError;
use crate::index::FileIndex;
use crate::types::FileReference;
use crate::workspace::Workspace;

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\B@[\[\]a-zA-Z]+\.[a-zA-Z]+").expect("valid mention pattern")
});

/// One `@bare_name` occurrence in a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub bare_name: String,
    /// Byte range of the whole token, `@` included.
    pub span: Range<usize>,
}

impl Mention {
    /// The token as written, e.g. `@foo.ts`.
    pub fn token(&self) -> String {
        format!("@{}", self.bare_name)
    }
}

/// Mentions in `text`, left to right. Call again to restart the scan.
pub fn find_mentions(text: &str) -> impl Iterator<Item = Mention> + '_ {
    MENTION.find_iter(text).map(|m| Mention {
        bare_name: m.as_str()[1..].to_string(),
        span: m.range(),
    })
}

/// Locations already injected during the current turn.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    locations: HashSet<String>,
}

impl DedupSet {
    pub fn contains(&self, location: &str) -> bool {
        self.locations.contains(location)
    }

    /// Returns false if the location was already present.
    pub fn insert(&mut self, location: &str) -> bool {
        self.locations.insert(location.to_string())
    }

    pub fn clear(&mut self) {
        self.locations.clear();
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// A mention that matched more than one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    pub bare_name: String,
    pub candidates: Vec<String>,
}

/// A file that could not be read while resolving.
#[derive(Debug, Clone, PartialEq)]
pub struct Unreadable {
    pub bare_name: String,
    pub error: ChatError,
}

/// What one resolution pass produced.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// `"{name}:\n{content}\n\n"` blocks in mention order.
    pub injected_text: String,
    /// Tokens whose `@` should be stripped from the visible prompt.
    pub fulfilled: Vec<String>,
    /// Set when the pass stopped at an ambiguous mention.
    pub ambiguity: Option<Ambiguity>,
    pub unreadable: Vec<Unreadable>,
}

impl Resolution {
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguity.is_some()
    }
}

/// Format an injected file block.
pub fn file_block(bare_name: &str, content: &str) -> String {
    format!("{}:\n{}\n\n", bare_name, content)
}

/// Resolve mentions against the index, reading files sequentially so the
/// dedup set is consulted and updated between reads.
///
/// A location already in `dedup` is skipped without being marked fulfilled,
/// so its raw `@name.ext` token stays in the prompt.
pub async fn resolve<I>(
    mentions: I,
    index: &FileIndex,
    dedup: &mut DedupSet,
    workspace: &dyn Workspace,
) -> Resolution
where
    I: IntoIterator<Item = Mention>,
{
    let mut resolution = Resolution::default();

    for mention in mentions {
        let candidates = index.candidates(&mention.bare_name);
        match candidates {
            [] => continue,
            [location] => {
                if dedup.contains(location) {
                    continue;
                }
                match workspace.read_file(location).await {
                    Ok(content) => {
                        resolution
                            .injected_text
                            .push_str(&file_block(&mention.bare_name, &content));
                        resolution.fulfilled.push(mention.token());
                        dedup.insert(location);
                    }
                    Err(e) => {
                        warn!(location = %location, error = %e, "skipping unreadable mention");
                        resolution.unreadable.push(Unreadable {
                            bare_name: mention.bare_name.clone(),
                            error: ChatError::FileRead {
                                location: location.clone(),
                                message: format!("{:#}", e),
                            },
                        });
                    }
                }
            }
            many => {
                resolution.ambiguity = Some(Ambiguity {
                    bare_name: mention.bare_name,
                    candidates: many.to_vec(),
                });
                break;
            }
        }
    }

    resolution
}

/// Replace the first occurrence of each fulfilled token with its bare form.
pub fn strip_fulfilled(text: &str, fulfilled: &[String]) -> String {
    let mut text = text.to_string();
    for token in fulfilled {
        let bare = token.strip_prefix('@').unwrap_or(token);
        text = replace_first_token(&text, token, bare);
    }
    text
}

/// Replace the first whole-token occurrence of `token`. An occurrence that
/// continues with more name characters (`@foo.ts` inside `@foo.tsx`) is a
/// different mention and is skipped.
pub fn replace_first_token(text: &str, token: &str, replacement: &str) -> String {
    let whole = text.match_indices(token).find(|(start, _)| {
        !text[start + token.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '[' || c == ']')
    });
    match whole {
        Some((start, _)) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..start]);
            out.push_str(replacement);
            out.push_str(&text[start + token.len()..]);
            out
        }
        None => text.to_string(),
    }
}

/// The numbered question shown for an ambiguous mention.
pub fn format_ambiguity_prompt(bare_name: &str, candidates: &[String]) -> String {
    let mut prompt = format!("Which {} are you referring to:\n", bare_name);
    for (i, location) in candidates.iter().enumerate() {
        prompt.push_str(&format!("({}) {}\n", i + 1, location));
    }
    prompt
}

/// Decode a numeric answer against the lines of a rendered ambiguity prompt.
///
/// Line 0 is the question, so answer `k` selects line `k`; the location is
/// whatever follows the first space.
pub fn location_from_response(answer: &str, lines: &[&str]) -> Option<String> {
    let index: usize = answer.trim().parse().ok()?;
    if index == 0 {
        return None;
    }
    let line = lines.get(index)?;
    let (_, location) = line.split_once(' ')?;
    Some(location.to_string())
}

/// The ambiguous mention currently waiting for a numeric answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDisambiguation {
    pub bare_name: String,
    pub candidates: Vec<String>,
    /// The rendered question, as published.
    pub prompt: String,
}

impl PendingDisambiguation {
    pub fn new(ambiguity: Ambiguity) -> Self {
        let prompt = format_ambiguity_prompt(&ambiguity.bare_name, &ambiguity.candidates);
        Self {
            bare_name: ambiguity.bare_name,
            candidates: ambiguity.candidates,
            prompt,
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Validate a 1-based answer and return the chosen file.
    pub fn choose(&self, answer: &str) -> Result<FileReference, ChatError> {
        let invalid = || ChatError::InvalidChoice {
            answer: answer.to_string(),
            max: self.candidate_count(),
        };
        let n: usize = answer.trim().parse().map_err(|_| invalid())?;
        if n == 0 || n > self.candidate_count() {
            return Err(invalid());
        }
        Ok(FileReference {
            bare_name: self.bare_name.clone(),
            location: self.candidates[n - 1].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryWorkspace {
        files: HashMap<String, String>,
        reads: Mutex<Vec<String>>,
    }

    impl MemoryWorkspace {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                reads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Workspace for MemoryWorkspace {
        async fn list_candidate_files(&self) -> Result<Vec<String>> {
            Ok(self.files.keys().cloned().collect())
        }

        async fn read_file(&self, location: &str) -> Result<String> {
            self.reads.lock().unwrap().push(location.to_string());
            self.files
                .get(location)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not found: {}", location))
        }
    }

    fn run<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Runtime::new().unwrap().block_on(f)
    }

    #[test]
    fn test_find_mentions_in_order() {
        let mentions: Vec<Mention> = find_mentions("see @foo.ts and @[id].tsx, not a@b.com").collect();
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].bare_name, "foo.ts");
        assert_eq!(mentions[0].span, 4..11);
        assert_eq!(mentions[1].bare_name, "[id].tsx");
    }

    #[test]
    fn test_find_mentions_is_restartable() {
        let text = "@a.rs @b.rs";
        let first: Vec<_> = find_mentions(text).collect();
        let second: Vec<_> = find_mentions(text).collect();
        assert_eq!(first, second);
        assert_eq!(first[1].token(), "@b.rs");
    }

    #[test]
    fn test_extension_is_letters_only() {
        let mentions: Vec<_> = find_mentions("@foo.ts2 @bar.d.ts").collect();
        assert_eq!(mentions[0].bare_name, "foo.ts");
        assert_eq!(mentions[1].bare_name, "bar.d");
    }

    #[test]
    fn test_no_mentions_means_nothing_injected() {
        let workspace = MemoryWorkspace::new(&[("/a/foo.ts", "x")]);
        let index = FileIndex::build(["/a/foo.ts"]);
        let mut dedup = DedupSet::default();
        for prompt in ["", "plain question", "email me at a@b.ts", "foo.ts without at"] {
            let res = run(resolve(find_mentions(prompt), &index, &mut dedup, &workspace));
            assert!(!res.is_ambiguous());
            assert_eq!(res.injected_text, "");
            assert!(res.fulfilled.is_empty());
        }
        assert!(workspace.reads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_single_candidate_injected_once_and_second_token_left_raw() {
        let workspace = MemoryWorkspace::new(&[("/a/foo.ts", "export x")]);
        let index = FileIndex::build(["/a/foo.ts"]);
        let mut dedup = DedupSet::default();
        let prompt = "compare @foo.ts with @foo.ts";

        let res = run(resolve(find_mentions(prompt), &index, &mut dedup, &workspace));

        assert_eq!(res.injected_text, "foo.ts:\nexport x\n\n");
        assert_eq!(res.fulfilled, vec!["@foo.ts".to_string()]);
        assert_eq!(workspace.reads.lock().unwrap().len(), 1);
        assert!(dedup.contains("/a/foo.ts"));
        assert_eq!(
            strip_fulfilled(prompt, &res.fulfilled),
            "compare foo.ts with @foo.ts"
        );
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let workspace = MemoryWorkspace::new(&[]);
        let index = FileIndex::default();
        let mut dedup = DedupSet::default();
        let res = run(resolve(find_mentions("@nope.rs"), &index, &mut dedup, &workspace));
        assert!(res.fulfilled.is_empty());
        assert!(res.ambiguity.is_none());
    }

    #[test]
    fn test_first_ambiguous_mention_stops_the_scan() {
        let workspace = MemoryWorkspace::new(&[
            ("/a/one.ts", "1"),
            ("/a/bar.ts", "a"),
            ("/b/bar.ts", "b"),
            ("/a/two.ts", "2"),
        ]);
        let index = FileIndex::build(["/a/one.ts", "/a/bar.ts", "/b/bar.ts", "/a/two.ts"]);
        let mut dedup = DedupSet::default();

        let res = run(resolve(
            find_mentions("@one.ts @bar.ts @two.ts"),
            &index,
            &mut dedup,
            &workspace,
        ));

        assert_eq!(res.injected_text, "one.ts:\n1\n\n");
        assert_eq!(
            res.ambiguity,
            Some(Ambiguity {
                bare_name: "bar.ts".to_string(),
                candidates: vec!["/a/bar.ts".to_string(), "/b/bar.ts".to_string()],
            })
        );
        assert_eq!(*workspace.reads.lock().unwrap(), vec!["/a/one.ts".to_string()]);
    }

    #[test]
    fn test_unreadable_file_is_skipped_and_reported() {
        let workspace = MemoryWorkspace::new(&[]);
        let index = FileIndex::build(["/gone/foo.ts"]);
        let mut dedup = DedupSet::default();

        let res = run(resolve(find_mentions("read @foo.ts"), &index, &mut dedup, &workspace));

        assert_eq!(res.injected_text, "");
        assert!(res.fulfilled.is_empty());
        assert!(dedup.is_empty());
        assert_eq!(res.unreadable.len(), 1);
        assert!(matches!(
            &res.unreadable[0].error,
            ChatError::FileRead { location, .. } if location == "/gone/foo.ts"
        ));
    }

    #[test]
    fn test_ambiguity_prompt_roundtrip() {
        let candidates: Vec<String> = (1..=4).map(|i| format!("/dir{}/bar.ts", i)).collect();
        let prompt = format_ambiguity_prompt("bar.ts", &candidates);
        let lines: Vec<&str> = prompt.split('\n').collect();

        assert_eq!(lines[0], "Which bar.ts are you referring to:");
        assert_eq!(prompt.lines().count(), candidates.len() + 1);
        for (k, expected) in candidates.iter().enumerate() {
            let k = k + 1;
            assert!(lines[k].starts_with(&format!("({}) ", k)));
            assert_eq!(
                location_from_response(&k.to_string(), &lines).as_deref(),
                Some(expected.as_str())
            );
        }
        assert_eq!(location_from_response("0", &lines), None);
        assert_eq!(location_from_response("x", &lines), None);
    }

    #[test]
    fn test_pending_choice_validation() {
        let pending = PendingDisambiguation::new(Ambiguity {
            bare_name: "bar.ts".to_string(),
            candidates: vec!["/a/bar.ts".to_string(), "/b/bar.ts".to_string()],
        });
        assert_eq!(pending.candidate_count(), 2);
        assert_eq!(
            pending.choose("2"),
            Ok(FileReference {
                bare_name: "bar.ts".to_string(),
                location: "/b/bar.ts".to_string(),
            })
        );
        assert_eq!(pending.choose(" 1 ").map(|r| r.location), Ok("/a/bar.ts".to_string()));
        assert!(matches!(
            pending.choose("3"),
            Err(ChatError::InvalidChoice { max: 2, .. })
        ));
        assert!(pending.choose("0").is_err());
        assert!(pending.choose("two").is_err());
        assert!(pending.prompt.contains("(2) /b/bar.ts"));
    }

    #[test]
    fn test_strip_skips_longer_mention_sharing_a_prefix() {
        assert_eq!(
            strip_fulfilled("see @foo.tsx and @foo.ts", &["@foo.ts".to_string()]),
            "see @foo.tsx and foo.ts"
        );
        assert_eq!(
            strip_fulfilled("@foo.ts, then @foo.ts", &["@foo.ts".to_string()]),
            "foo.ts, then @foo.ts"
        );
        assert_eq!(replace_first_token("@foo.tsx", "@foo.ts", "foo.ts"), "@foo.tsx");
    }
}
