//! Query canonicalization shared by the fingerprint and embedding paths.
//!
//! Both cache tiers must key on the same canonical text, so the fingerprint
//! builder and the embedding builder call the same `normalize` function.
//! The function is pure and total: it never errors and
//! `normalize(normalize(x)) == normalize(x)` for all inputs.

/// Fixed contraction expansion table, applied after lowercasing.
///
/// Longer forms first so that "isn't" never partially matches inside
/// "doesn't" style lookups. Matching is whole-word.
const CONTRACTIONS: &[(&str, &str)] = &[
    ("isn't", "is not"),
    ("aren't", "are not"),
    ("wasn't", "was not"),
    ("weren't", "were not"),
    ("doesn't", "does not"),
    ("don't", "do not"),
    ("didn't", "did not"),
    ("can't", "cannot"),
    ("couldn't", "could not"),
    ("shouldn't", "should not"),
    ("wouldn't", "would not"),
    ("won't", "will not"),
    ("hasn't", "has not"),
    ("haven't", "have not"),
    ("hadn't", "had not"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("there's", "there is"),
    ("what's", "what is"),
    ("who's", "who is"),
    ("where's", "where is"),
    ("why's", "why is"),
    ("how's", "how is"),
    ("let's", "let us"),
    ("we're", "we are"),
    ("they're", "they are"),
    ("you're", "you are"),
    ("i'm", "i am"),
    ("we've", "we have"),
    ("they've", "they have"),
    ("you've", "you have"),
    ("i've", "i have"),
    ("it'll", "it will"),
    ("we'll", "we will"),
    ("they'll", "they will"),
    ("you'll", "you will"),
    ("i'll", "i will"),
    ("i'd", "i would"),
    ("we'd", "we would"),
    ("they'd", "they would"),
    ("you'd", "you would"),
];

/// Canonicalize a free-text question for hashing and embedding.
///
/// Applies, in order: lowercase, whole-word contraction expansion, removal
/// of all punctuation except `?`, and whitespace-run collapse. Leading and
/// trailing whitespace is trimmed.
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();

    // Expand contractions word by word so we only match whole words.
    let expanded: String = lowered
        .split_whitespace()
        .map(expand_word)
        .collect::<Vec<_>>()
        .join(" ");

    // Strip punctuation except '?', then collapse whitespace runs that the
    // removal may have created.
    let stripped: String = expanded
        .chars()
        .map(|c| {
            if c == '?' || c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn expand_word(word: &str) -> String {
    // Contractions may arrive with trailing punctuation ("isn't?"), so
    // compare against the word with its trailing non-alphanumerics peeled.
    let trailing_start = word
        .char_indices()
        .rev()
        .take_while(|(_, c)| !c.is_alphanumeric())
        .map(|(i, _)| i)
        .last();
    let (core, tail) = match trailing_start {
        Some(i) => word.split_at(i),
        None => (word, ""),
    };

    for (contraction, expansion) in CONTRACTIONS {
        if core == *contraction {
            return format!("{expansion}{tail}");
        }
    }
    word.to_string()
}
