//! Plain-text rendering of catalog records.

use shared::Anime;

/// Longest description shown on a card, in characters
pub const DESCRIPTION_LIMIT: usize = 1024;

const ELLIPSIS: &str = "...";

/// Shorten `text` to at most `max_chars` characters, ending with "..." when cut
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Remove `[...]` markup (including nested brackets) and CJK characters
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;

    for c in text.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 && !is_cjk(c) => out.push(c),
            _ => {}
        }
    }

    out.trim().to_string()
}

fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3040..=0x309F     // Hiragana
            | 0x30A0..=0x30FF   // Katakana
            | 0x3400..=0x4DBF   // CJK extension A
            | 0x4E00..=0x9FFF   // CJK unified ideographs
    )
}

/// Multi-line card for a single anime
pub fn anime_card(anime: &Anime, is_favorite: bool) -> String {
    let description = anime
        .description
        .as_deref()
        .map(|d| strip_markup(&truncate_with_ellipsis(d, DESCRIPTION_LIMIT)))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "none".to_string());

    let mut card = format!(
        "{}\n{}\n\nType: {}\nScore: {}\nStatus: {}\nEpisodes: {}\n\nDescription: {}",
        strip_markup(&anime.name),
        strip_markup(&anime.russian),
        anime.kind,
        anime.score,
        anime.status,
        anime.episodes,
        description,
    );

    if is_favorite {
        card.push_str("\n\n* In favorites");
    }
    card
}

/// Numbered one-line-per-result listing
pub fn search_listing(results: &[Anime]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, anime)| {
            let score = if anime.score.is_empty() { "-" } else { anime.score.as_str() };
            format!(
                "{:>2}. [{}] {} ({}, {})",
                i + 1,
                anime.id,
                anime.display_title(),
                anime.kind,
                score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
