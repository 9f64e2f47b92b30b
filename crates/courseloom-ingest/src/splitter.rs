//! Text chunk splitting.
//!
//! Splits normalized text into ordered, bounded chunks with overlap between
//! neighbors. Granularity degrades as needed: paragraphs, then sentences for
//! an oversize paragraph, then fixed character windows for an oversize
//! sentence. Lengths are counted in chars so CJK text is sliced safely.

use once_cell::sync::Lazy;
use regex::Regex;

static PARAGRAPH_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// A sentence runs up to CJK or Latin terminal punctuation; trailing text
/// without a terminator counts as one sentence.
static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?。！？…]+[.!?。！？…]*").unwrap());

/// Split text into ordered chunks of at most `chunk_size` chars, seeding each
/// chunk after the first with the last `overlap` chars of its predecessor.
///
/// Pure and deterministic. Empty or whitespace-only input yields no chunks,
/// and no produced chunk is empty.
pub fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 {
        return Vec::new();
    }
    // An overlap >= chunk_size could never advance the slice window.
    let overlap = overlap.min(chunk_size - 1);

    let paragraphs = normalize_paragraphs(text);
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let normalized = paragraphs.join(" ");
    if char_len(&normalized) <= chunk_size {
        return vec![normalized];
    }

    greedy_accumulate(&paragraphs, chunk_size, overlap, &|paragraph| {
        let sentences = split_sentences(paragraph);
        greedy_accumulate(&sentences, chunk_size, overlap, &|sentence| {
            fixed_slices(sentence, chunk_size, overlap)
        })
    })
}

/// Unify line endings and collapse each paragraph's internal whitespace runs
/// to single spaces. Paragraphs are separated by blank lines.
fn normalize_paragraphs(text: &str) -> Vec<String> {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    PARAGRAPH_BREAK_RE
        .split(&unified)
        .map(|paragraph| {
            paragraph
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Greedily pack units into chunks of at most `chunk_size` chars, joining
/// with single spaces. A flushed chunk's `overlap` tail seeds the next one;
/// a unit larger than `chunk_size` is handed to `split_oversize`.
fn greedy_accumulate(
    units: &[String],
    chunk_size: usize,
    overlap: usize,
    split_oversize: &dyn Fn(&str) -> Vec<String>,
) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    // `current` may begin with an overlap seed; `has_content` tracks whether
    // any unit has landed in it, so a bare seed is never emitted as a chunk.
    let mut current = String::new();
    let mut has_content = false;

    for unit in units {
        if char_len(unit) > chunk_size {
            if has_content {
                chunks.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            chunks.extend(
                split_oversize(unit)
                    .into_iter()
                    .filter(|chunk| !chunk.is_empty()),
            );
            current = seed_from(chunks.last(), overlap);
            has_content = false;
            continue;
        }

        if current.is_empty() {
            current.push_str(unit);
            has_content = true;
        } else if char_len(&current) + 1 + char_len(unit) <= chunk_size {
            current.push(' ');
            current.push_str(unit);
            has_content = true;
        } else if has_content {
            chunks.push(std::mem::take(&mut current));
            let seed = seed_from(chunks.last(), overlap);
            if !seed.is_empty() && char_len(&seed) + 1 + char_len(unit) <= chunk_size {
                current = format!("{seed} {unit}");
            } else {
                current = unit.clone();
            }
            has_content = true;
        } else {
            // A bare seed the unit cannot join; the seed gives way.
            current = unit.clone();
            has_content = true;
        }
    }

    if has_content && !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn seed_from(last: Option<&String>, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    last.map(|chunk| tail_chars(chunk, overlap)).unwrap_or_default()
}

/// Fixed character windows advancing by `chunk_size - overlap`, so each slice
/// repeats the previous slice's last `overlap` chars.
fn fixed_slices(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let step = (chunk_size - overlap).max(1);
    let mut slices = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        slices.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    slices
}

fn tail_chars(text: &str, count: usize) -> String {
    let total = char_len(text);
    text.chars().skip(total.saturating_sub(count)).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(split_into_chunks("", 500, 100).is_empty());
        assert!(split_into_chunks("   \n\n  \t ", 500, 100).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_into_chunks("Hello, world!", 500, 100);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_single_chunk_is_normalized() {
        let chunks = split_into_chunks("  Hello \t  world \r\n still  one   line ", 500, 100);
        assert_eq!(chunks, vec!["Hello world still one line"]);
    }

    #[test]
    fn test_two_paragraphs_fit_in_one_chunk() {
        let chunks = split_into_chunks("Paragraph A.\n\nParagraph B.", 10000, 100);
        assert_eq!(chunks, vec!["Paragraph A. Paragraph B."]);
    }

    #[test]
    fn test_paragraph_accumulation_with_overlap_seed() {
        let text = format!("{}\n\n{}\n\n{}", "a".repeat(10), "b".repeat(10), "c".repeat(10));
        let chunks = split_into_chunks(&text, 20, 5);
        assert_eq!(
            chunks,
            vec![
                "a".repeat(10),
                format!("{} {}", "a".repeat(5), "b".repeat(10)),
                format!("{} {}", "b".repeat(5), "c".repeat(10)),
            ]
        );
    }

    #[test]
    fn test_oversize_paragraph_splits_on_sentences() {
        let chunks = split_into_chunks("One two. Three four. Five six.", 12, 0);
        assert_eq!(chunks, vec!["One two.", "Three four.", "Five six."]);
    }

    #[test]
    fn test_cjk_sentence_boundaries() {
        let chunks = split_into_chunks("第一句话。第二句话。第三句话。", 6, 0);
        assert_eq!(chunks, vec!["第一句话。", "第二句话。", "第三句话。"]);
    }

    #[test]
    fn test_runon_text_falls_back_to_char_slicing() {
        let text = "abcdefghijklmnopqrst"; // 20 chars, no sentence punctuation
        let chunks = split_into_chunks(text, 5, 1);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 5);
        }
        // Consecutive slices share the last overlap character.
        for pair in chunks.windows(2) {
            let prev_tail = pair[0].chars().last().unwrap();
            let next_head = pair[1].chars().next().unwrap();
            assert_eq!(prev_tail, next_head);
        }
        // Every input character survives somewhere.
        let joined: String = chunks.concat();
        for c in text.chars() {
            assert!(joined.contains(c));
        }
    }

    #[test]
    fn test_chunks_respect_size_bound() {
        let text = "Curricula are built in stages. Each stage has goals and materials. \
                    Assessment follows instruction closely. Review cycles keep content current. \
                    Teachers adapt pacing to their cohort.\n\n\
                    Another paragraph with several short sentences. It keeps going for a while. \
                    And then some more text to force multiple chunks out of the splitter.";
        let chunks = split_into_chunks(text, 80, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 80, "oversize chunk: {chunk:?}");
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Some paragraph here.\n\nAnother one follows. With two sentences.";
        let a = split_into_chunks(text, 30, 10);
        let b = split_into_chunks(text, 30, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlap_larger_than_chunk_size_is_clamped() {
        let chunks = split_into_chunks("abcdefghij", 4, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4);
        }
    }

    #[test]
    fn test_zero_chunk_size_yields_nothing() {
        assert!(split_into_chunks("some text", 0, 0).is_empty());
    }
}
