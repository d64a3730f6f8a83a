/// Ordered separator hierarchy used by the recursive splitter. Earlier
/// entries are preferred; the last resort before fixed-size windows is a
/// single space.
const SEPARATORS: [&str; 8] = ["\n\n", "\n", ". ", "? ", "! ", "; ", ", ", " "];

const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Recursive text splitter with separator hierarchy and word-boundary
/// overlap. Sizes are measured in chars, not bytes, so multi-byte text
/// chunks the same way as ASCII.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Degenerate parameters are clamped: zero size falls back to the
    /// default, and an overlap at or above the size is reduced to a
    /// quarter of it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let chunk_overlap = if chunk_overlap >= chunk_size {
            chunk_size / 4
        } else {
            chunk_overlap
        };
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits text into chunks of at most `chunk_size` chars (plus the
    /// prepended overlap). Empty and whitespace-only chunks are dropped.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        self.recursive_split(text, &SEPARATORS)
    }

    fn recursive_split(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            let trimmed = text.trim();
            return if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            };
        }

        let Some(sep_pos) = separators.iter().position(|sep| text.contains(sep)) else {
            return self.split_by_size(text);
        };
        let best_sep = separators[sep_pos];

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for part in text.split(best_sep) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let candidate_len = if current.is_empty() {
                char_len(part)
            } else {
                char_len(&current) + char_len(best_sep) + char_len(part)
            };

            if candidate_len <= self.chunk_size {
                if !current.is_empty() {
                    current.push_str(best_sep);
                }
                current.push_str(part);
                continue;
            }

            // Current chunk is full, flush it before placing this part.
            if !current.is_empty() {
                let chunk = current.trim().to_string();
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
            }

            if char_len(part) > self.chunk_size {
                // Oversized segment: recurse with the remaining separators.
                let next_seps = if sep_pos + 1 < separators.len() {
                    &separators[sep_pos + 1..]
                } else {
                    separators
                };
                chunks.extend(self.recursive_split(part, next_seps));
                current.clear();
            } else {
                current.clear();
                current.push_str(part);
            }
        }

        if !current.is_empty() {
            let chunk = current.trim().to_string();
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
        }

        if self.chunk_overlap > 0 && chunks.len() > 1 {
            self.apply_overlap(chunks)
        } else {
            chunks
        }
    }

    /// Fallback when no separator matches: fixed-size char windows
    /// advancing by `chunk_size - chunk_overlap`.
    fn split_by_size(&self, text: &str) -> Vec<String> {
        let runes: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();

        let step = if self.chunk_size > self.chunk_overlap {
            self.chunk_size - self.chunk_overlap
        } else {
            self.chunk_size
        };

        let mut start = 0;
        while start < runes.len() {
            let end = (start + self.chunk_size).min(runes.len());
            let chunk: String = runes[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            start += step;
        }

        chunks
    }

    /// Prepends up to `chunk_overlap` chars from the tail of the previous
    /// chunk, truncated forward to the nearest whitespace so no word is
    /// split.
    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        let mut result = Vec::with_capacity(chunks.len());
        result.push(chunks[0].clone());

        for i in 1..chunks.len() {
            let prev: Vec<char> = chunks[i - 1].chars().collect();
            let overlap_start = prev.len().saturating_sub(self.chunk_overlap);
            let mut overlap: String = prev[overlap_start..].iter().collect();

            if let Some(idx) = overlap.rfind(' ') {
                if idx > 0 {
                    overlap = overlap[idx + 1..].to_string();
                }
            }

            if !overlap.is_empty() && !chunks[i].starts_with(&overlap) {
                result.push(format!("{overlap} {}", chunks[i]));
            } else {
                result.push(chunks[i].clone());
            }
        }

        result
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
