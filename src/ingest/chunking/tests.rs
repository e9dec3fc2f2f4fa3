use super::*;

#[test]
fn default_sizes() {
    let config = ChunkingConfig::default();
    assert_eq!(config.code_chunk_size, 800);
    assert_eq!(config.code_chunk_overlap, 100);
    assert_eq!(config.prose_chunk_size, 1000);
    assert_eq!(config.prose_chunk_overlap, 150);

    let code = config.code_splitter();
    assert_eq!(code.chunk_size(), 800);
    assert_eq!(code.chunk_overlap(), 100);
}

#[test]
fn short_text_is_one_chunk() {
    let splitter = ChunkingConfig::default().prose_splitter();
    let chunks = splitter.split_text("  A short paragraph.  \n");
    assert_eq!(chunks, vec!["A short paragraph.".to_string()]);
}

#[test]
fn blank_text_produces_nothing() {
    let splitter = ChunkingConfig::default().code_splitter();
    assert!(splitter.split_text("").is_empty());
    assert!(splitter.split_text("   \n\n\t  ").is_empty());
}

#[test]
fn chunks_respect_size_limit() {
    let splitter = RecursiveSplitter::new(100, 20, PROSE_SEPARATORS);
    let text = "word ".repeat(200);
    let chunks = splitter.split_text(&text);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 100, "chunk too long: {}", chunk.len());
        assert!(!chunk.is_empty());
    }
}

#[test]
fn consecutive_chunks_overlap() {
    let splitter = RecursiveSplitter::new(50, 20, PROSE_SEPARATORS);
    let text = (0..40)
        .map(|i| format!("w{i:02}"))
        .collect::<Vec<_>>()
        .join(" ");
    let chunks = splitter.split_text(&text);

    assert!(chunks.len() > 1);
    for pair in chunks.windows(2) {
        let last_word = pair[0]
            .split_whitespace()
            .last()
            .expect("chunk has words");
        assert!(
            pair[1].contains(last_word),
            "expected {last_word:?} to carry into {:?}",
            pair[1]
        );
    }
}

#[test]
fn code_splits_at_definitions() {
    let body = "    x = 1\n".repeat(8);
    let source = format!("def first():\n{body}\ndef second():\n{body}\nclass Third:\n{body}");
    let splitter = RecursiveSplitter::new(120, 0, CODE_SEPARATORS);
    let chunks = splitter.split_text(&source);

    assert!(chunks.iter().any(|c| c.starts_with("def first():")));
    assert!(chunks.iter().any(|c| c.starts_with("def second():")));
    assert!(chunks.iter().any(|c| c.starts_with("class Third:")));
}

#[test]
fn paragraphs_are_kept_together_when_they_fit() {
    let splitter = RecursiveSplitter::new(60, 0, PROSE_SEPARATORS);
    let text = "First paragraph is here.\n\nSecond paragraph follows.\n\nThird one is last.";
    let chunks = splitter.split_text(text);

    assert_eq!(chunks.len(), 2);
    assert_eq!(
        chunks[0],
        "First paragraph is here.\n\nSecond paragraph follows."
    );
    assert_eq!(chunks[1], "Third one is last.");
}

#[test]
fn unbroken_text_falls_back_to_characters() {
    let splitter = RecursiveSplitter::new(10, 0, PROSE_SEPARATORS);
    let chunks = splitter.split_text(&"x".repeat(35));
    assert_eq!(chunks.len(), 4);
    assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    assert_eq!(chunks.concat().len(), 35);
}

#[test]
fn multibyte_text_is_measured_in_characters() {
    let splitter = RecursiveSplitter::new(10, 0, PROSE_SEPARATORS);
    let chunks = splitter.split_text(&"é".repeat(25));
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.chars().count() <= 10));
}

#[test]
fn overlap_is_clamped_below_size() {
    let splitter = RecursiveSplitter::new(10, 50, PROSE_SEPARATORS);
    assert_eq!(splitter.chunk_overlap(), 9);
}

#[test]
fn separator_is_kept_with_following_piece() {
    let pieces = split_keeping_separator("a\ndef b\ndef c", "\ndef ");
    assert_eq!(pieces, vec!["a", "\ndef b", "\ndef c"]);

    let pieces = split_keeping_separator("\ndef only", "\ndef ");
    assert_eq!(pieces, vec!["\ndef only"]);
}
