//! Markdown-aware chunking.
//!
//! The document is cut into sections at ATX headings (`#` through `######`).
//! Each section is then packed into chunks paragraph by paragraph, keeping the
//! running token estimate within the configured budget.
//!
//! Fenced code blocks are swapped out for single-token placeholders before any
//! splitting happens and swapped back in when a chunk is emitted, so a code
//! block always lands whole inside one chunk. A paragraph that alone exceeds
//! the budget is broken on sentence boundaries and the sentences are packed
//! the same way.
//!
//! ```
//! use recall_context::{Chunker, MarkdownChunker};
//!
//! let chunker = MarkdownChunker::new(64);
//! let chunks = chunker.chunk("# Intro\n\nHello there.\n\n## Details\n\nMore text.");
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].metadata["heading"], "Intro");
//! assert_eq!(chunks[1].metadata["heading_level"], "2");
//! ```

use regex::Regex;
use std::sync::LazyLock;

use crate::chunk::{Chunk, Chunker, estimate_tokens};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*?)(?:\s+#+)?\s*$").unwrap());
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{1}CODE([0-9]+)\u{1}").unwrap());

const FENCE: &str = "```";

/// Heading-aware chunker for Markdown documents.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    max_tokens: usize,
}

/// One heading-bounded region of a document, still in placeholder form.
#[derive(Debug)]
struct Section {
    heading: Option<(usize, String)>,
    text: String,
}

impl MarkdownChunker {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Pack one section into finished chunk texts.
    fn pack_section(&self, section: &str, blocks: &[String]) -> Vec<String> {
        let mut packer = Packer::new(self.max_tokens, "\n\n");

        for paragraph in PARAGRAPH_BREAK.split(section) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            let restored = restore_blocks(paragraph, blocks);
            let tokens = estimate_tokens(&restored);

            if tokens <= self.max_tokens {
                packer.push(restored, tokens);
                continue;
            }

            // Oversized paragraph: close what we have and pack its sentences
            packer.flush();
            let mut sentences = Packer::new(self.max_tokens, " ");
            for sentence in split_sentences(paragraph) {
                let restored = restore_blocks(sentence, blocks);
                let tokens = estimate_tokens(&restored);
                sentences.push(restored, tokens);
            }
            packer.extend(sentences.finish());
        }

        packer.finish()
    }
}

impl Chunker for MarkdownChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let (masked, blocks) = extract_code_blocks(text);
        let mut chunks = Vec::new();

        for section in split_sections(&masked) {
            for content in self.pack_section(&section.text, &blocks) {
                let mut chunk = Chunk::new(content, chunks.len());
                if let Some((level, heading)) = &section.heading {
                    chunk = chunk
                        .with_meta("heading", heading.clone())
                        .with_meta("heading_level", level.to_string());
                }
                chunks.push(chunk);
            }
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "markdown"
    }
}

/// Greedy accumulator that joins pieces while they fit in the token budget.
struct Packer {
    max_tokens: usize,
    separator: &'static str,
    buffer: Vec<String>,
    buffer_tokens: usize,
    done: Vec<String>,
}

impl Packer {
    fn new(max_tokens: usize, separator: &'static str) -> Self {
        Self {
            max_tokens,
            separator,
            buffer: Vec::new(),
            buffer_tokens: 0,
            done: Vec::new(),
        }
    }

    fn push(&mut self, piece: String, tokens: usize) {
        if !self.buffer.is_empty() && self.buffer_tokens + tokens > self.max_tokens {
            self.flush();
        }
        self.buffer.push(piece);
        self.buffer_tokens += tokens;
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.done.push(self.buffer.join(self.separator));
        self.buffer.clear();
        self.buffer_tokens = 0;
    }

    fn extend(&mut self, finished: Vec<String>) {
        self.flush();
        self.done.extend(finished);
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.done
    }
}

/// Replace every fenced code block with a placeholder line.
///
/// Returns the masked text and the original blocks, indexed by placeholder
/// number. An unterminated fence runs to the end of the document.
fn extract_code_blocks(text: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(text.len());
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let is_fence = line.trim_start().starts_with(FENCE);
        match current.as_mut() {
            Some(block) => {
                block.push(line);
                if is_fence {
                    masked.push_str(&placeholder(blocks.len()));
                    masked.push('\n');
                    blocks.push(block.join("\n"));
                    current = None;
                }
            }
            None if is_fence => current = Some(vec![line]),
            None => {
                masked.push_str(line);
                masked.push('\n');
            }
        }
    }

    if let Some(block) = current {
        masked.push_str(&placeholder(blocks.len()));
        masked.push('\n');
        blocks.push(block.join("\n"));
    }

    (masked, blocks)
}

fn placeholder(n: usize) -> String {
    format!("\u{1}CODE{n}\u{1}")
}

fn restore_blocks(text: &str, blocks: &[String]) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| blocks.get(n))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Cut masked text into heading-bounded sections.
///
/// Content before the first heading becomes a section without a heading. The
/// heading line itself stays at the top of its section's text.
fn split_sections(masked: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        heading: None,
        text: String::new(),
    };

    for line in masked.lines() {
        if let Some(caps) = HEADING.captures(line) {
            if current.heading.is_some() || !current.text.trim().is_empty() {
                sections.push(current);
            }
            current = Section {
                heading: Some((caps[1].len(), caps[2].to_string())),
                text: String::new(),
            };
        }
        current.text.push_str(line);
        current.text.push('\n');
    }

    if current.heading.is_some() || !current.text.trim().is_empty() {
        sections.push(current);
    }

    sections
}

/// Split a paragraph after each `.`, `!` or `?` that is followed by whitespace.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for mat in SENTENCE_END.find_iter(paragraph) {
        // Punctuation is one ASCII byte; keep it with the sentence
        let end = mat.start() + 1;
        let sentence = paragraph[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = mat.end();
    }

    let rest = paragraph[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}
