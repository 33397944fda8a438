//! Streaming detector for `<delegate to="AGENT">TASK</delegate>` directives
//!
//! Text is forwarded as soon as it is known not to belong to a directive.
//! Anything from a `<` that could still open one is held back until the tag
//! either completes or stops matching the directive grammar.

use once_cell::sync::Lazy;
use regex::Regex;

const OPEN_MARKER: &str = "<delegate";
const CLOSE_MARKER: &str = "</delegate>";
const TO_ATTR: &str = "to=\"";

static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\A<delegate\s+to="([^"]+)">([\s\S]*?)</delegate>"#)
        .expect("delegate pattern is valid")
});

/// A complete delegation request found in coordinator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub agent: String,
    pub task: String,
}

/// What one pushed chunk produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    /// Text that is safe to show now
    pub forward: String,
    /// Set on the chunk that completed the directive
    pub directive: Option<Directive>,
}

enum Candidate {
    /// Still a possible directive; wait for more text
    Pending,
    NotDirective,
    Complete(Directive),
}

/// Incremental parser for one coordinator turn
#[derive(Debug)]
pub struct DelegationParser {
    held: String,
    max_held_bytes: usize,
    found: bool,
}

impl DelegationParser {
    pub fn new(max_held_bytes: usize) -> Self {
        Self {
            held: String::new(),
            max_held_bytes,
            found: false,
        }
    }

    /// True once a directive has been extracted; later text is dropped.
    pub fn has_directive(&self) -> bool {
        self.found
    }

    pub fn push(&mut self, chunk: &str) -> ParseOutput {
        let mut output = ParseOutput::default();
        if self.found {
            return output;
        }
        self.held.push_str(chunk);

        loop {
            let Some(start) = self.held.find('<') else {
                output.forward.push_str(&self.held);
                self.held.clear();
                break;
            };
            output.forward.push_str(&self.held[..start]);
            self.held.drain(..start);

            match classify(&self.held) {
                Candidate::Complete(directive) => {
                    self.found = true;
                    self.held.clear();
                    output.directive = Some(directive);
                    break;
                }
                Candidate::Pending if self.held.len() <= self.max_held_bytes => break,
                Candidate::Pending | Candidate::NotDirective => {
                    // Release the `<` and keep scanning after it.
                    output.forward.push('<');
                    self.held.drain(..1);
                }
            }
        }

        output
    }

    /// End of turn: release whatever is still held if no directive was found.
    pub fn finish(&mut self) -> String {
        if self.found {
            self.held.clear();
            return String::new();
        }
        std::mem::take(&mut self.held)
    }
}

/// Classify text that starts with `<`.
fn classify(text: &str) -> Candidate {
    if text.len() < OPEN_MARKER.len() {
        return if OPEN_MARKER.starts_with(text) {
            Candidate::Pending
        } else {
            Candidate::NotDirective
        };
    }
    let Some(rest) = text.strip_prefix(OPEN_MARKER) else {
        return Candidate::NotDirective;
    };

    // At least one whitespace character before the attribute.
    let after_ws = rest.trim_start();
    if rest.is_empty() {
        return Candidate::Pending;
    }
    if after_ws.len() == rest.len() {
        return Candidate::NotDirective;
    }
    if after_ws.is_empty() {
        return Candidate::Pending;
    }

    if after_ws.len() < TO_ATTR.len() {
        return if TO_ATTR.starts_with(after_ws) {
            Candidate::Pending
        } else {
            Candidate::NotDirective
        };
    }
    let Some(name_and_rest) = after_ws.strip_prefix(TO_ATTR) else {
        return Candidate::NotDirective;
    };

    let Some(quote) = name_and_rest.find('"') else {
        return Candidate::Pending;
    };
    if quote == 0 {
        return Candidate::NotDirective;
    }
    let after_name = &name_and_rest[quote + 1..];
    match after_name.chars().next() {
        None => return Candidate::Pending,
        Some('>') => {}
        Some(_) => return Candidate::NotDirective,
    }

    if !after_name.contains(CLOSE_MARKER) {
        return Candidate::Pending;
    }

    match DIRECTIVE_RE.captures(text) {
        Some(caps) => Candidate::Complete(Directive {
            agent: caps[1].to_string(),
            task: caps[2].trim().to_string(),
        }),
        None => Candidate::NotDirective,
    }
}
