//! Boundary-aware chunking with overlap.
//!
//! Code is split line by line, preferring lines that open a semantic unit
//! (function, class, decorator, ...) once the running chunk is reasonably
//! full. Languages without marker patterns fall back to fixed character
//! windows. Every chunk is a contiguous slice of the source: the overlap
//! carried from the previous chunk is a prefix of `content`, and the
//! non-overlap parts of consecutive chunks tile the file exactly.

use crate::languages::{Lang, Markers};

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Nominal chunk size in characters (default: 1000).
    pub chunk_size: usize,
    /// Characters carried over from the end of the previous chunk (default: 200).
    pub overlap: usize,
    /// Fraction of `chunk_size` a chunk must reach before a boundary line may
    /// start a new one (default: 0.6).
    pub split_threshold: f64,
    /// Chunks larger than `chunk_size * oversize_factor` are flagged (default: 1.5).
    pub oversize_factor: f64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            split_threshold: 0.6,
            oversize_factor: 1.5,
        }
    }
}

impl ChunkerConfig {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn threshold_chars(&self) -> usize {
        (self.limit() as f64 * self.split_threshold).ceil() as usize
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_oversized(&self, size: usize) -> bool {
        size as f64 > self.limit() as f64 * self.oversize_factor
    }

    fn limit(&self) -> usize {
        self.chunk_size.max(1)
    }
}

/// One segment of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Ordinal position within the file, starting at 0.
    pub index: usize,
    /// Byte offset of the first byte of `content` (overlap included).
    pub start_offset: usize,
    /// Byte offset one past the last byte of `content`.
    pub end_offset: usize,
    /// Byte length of the overlap prefix carried from the previous chunk.
    pub overlap: usize,
    /// 1-based line range covered by `content`, inclusive.
    pub line_range: (usize, usize),
    pub content: String,
    /// Length of `content` in characters.
    pub size: usize,
    /// `size` exceeds the oversize limit; the chunk is kept whole.
    pub oversized: bool,
}

impl Chunk {
    /// The part of `content` not shared with the previous chunk.
    #[must_use]
    pub fn fresh_content(&self) -> &str {
        &self.content[self.overlap..]
    }
}

struct Line<'a> {
    text: &'a str,
    start: usize,
    chars: usize,
}

struct Builder<'a> {
    source: &'a str,
    newlines: Vec<usize>,
    config: &'a ChunkerConfig,
    chunks: Vec<Chunk>,
}

impl<'a> Builder<'a> {
    fn new(source: &'a str, config: &'a ChunkerConfig) -> Self {
        Self {
            source,
            newlines: source.match_indices('\n').map(|(i, _)| i).collect(),
            config,
            chunks: Vec::new(),
        }
    }

    fn line_of(&self, byte: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < byte) + 1
    }

    fn push(&mut self, start: usize, fresh_start: usize, end: usize) {
        let content = &self.source[start..end];
        let size = content.chars().count();
        self.chunks.push(Chunk {
            index: self.chunks.len(),
            start_offset: start,
            end_offset: end,
            overlap: fresh_start - start,
            line_range: (self.line_of(start), self.line_of(end.saturating_sub(1).max(start))),
            content: content.to_owned(),
            size,
            oversized: self.config.is_oversized(size),
        });
    }
}

/// Split `source` into ordered, overlapping chunks.
///
/// Empty input yields no chunks; input no longer than `chunk_size`
/// characters yields exactly one.
#[must_use]
pub fn chunk_content(source: &str, lang: Lang, config: &ChunkerConfig) -> Vec<Chunk> {
    if source.is_empty() {
        return Vec::new();
    }

    let mut builder = Builder::new(source, config);
    if source.chars().count() <= config.limit() {
        builder.push(0, 0, source.len());
        return builder.chunks;
    }

    match lang.boundary_markers() {
        markers @ Markers::Semantic(_) => split_semantic(&mut builder, markers),
        Markers::PlainText => split_fixed(&mut builder),
    }
    builder.chunks
}

fn split_semantic(builder: &mut Builder<'_>, markers: Markers) {
    let config = builder.config;
    let limit = config.limit();
    let threshold = config.threshold_chars();

    let mut offset = 0;
    let lines: Vec<Line<'_>> = builder
        .source
        .split_inclusive('\n')
        .map(|text| {
            let line = Line {
                text,
                start: offset,
                chars: text.chars().count(),
            };
            offset += text.len();
            line
        })
        .collect();

    // Current chunk spans lines[chunk_start..i]; lines[chunk_start..fresh_start]
    // are overlap carried from the previous chunk.
    let mut chunk_start = 0;
    let mut fresh_start = 0;
    let mut chunk_chars = 0;

    for (i, line) in lines.iter().enumerate() {
        let has_fresh = i > fresh_start;
        let at_boundary = has_fresh && chunk_chars >= threshold && markers.is_boundary(line.text);
        let overflows = has_fresh && chunk_chars + line.chars > limit;

        if at_boundary || overflows {
            builder.push(lines[chunk_start].start, lines[fresh_start].start, line.start);

            let budget = config.overlap.min(limit.saturating_sub(line.chars));
            chunk_start = overlap_start(&lines, chunk_start, i, budget, markers);
            fresh_start = i;
            chunk_chars = lines[chunk_start..i].iter().map(|l| l.chars).sum();
        }
        chunk_chars += line.chars;
    }

    if fresh_start < lines.len() {
        builder.push(lines[chunk_start].start, lines[fresh_start].start, builder.source.len());
    }
}

/// First line of the overlap window taken from the tail of `lines[from..to]`.
///
/// The window is the longest run of whole trailing lines within `budget`
/// characters. If it contains a boundary line, it starts at the earliest one.
fn overlap_start(lines: &[Line<'_>], from: usize, to: usize, budget: usize, markers: Markers) -> usize {
    let mut start = to;
    let mut total = 0;
    while start > from {
        let chars = lines[start - 1].chars;
        if total + chars > budget {
            break;
        }
        total += chars;
        start -= 1;
    }
    (start..to)
        .find(|&k| markers.is_boundary(lines[k].text))
        .unwrap_or(start)
}

fn split_fixed(builder: &mut Builder<'_>) {
    let limit = builder.config.limit();
    let overlap = builder.config.overlap.min(limit - 1);

    let mut offsets: Vec<usize> = builder.source.char_indices().map(|(b, _)| b).collect();
    let total = offsets.len();
    offsets.push(builder.source.len());

    let mut start = 0;
    let mut fresh = 0;
    loop {
        let end = (start + limit).min(total);
        builder.push(offsets[start], offsets[fresh], offsets[end]);
        if end == total {
            break;
        }
        fresh = end;
        start = end - overlap;
    }
}
