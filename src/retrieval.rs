//! Text preparation and similarity ranking for the assistant's retrieval step.

use crate::models::MemoFiche;

/// Upper bound on a chunk's length, in characters.
pub const MAX_CHUNK_CHARS: usize = 1200;

/// Render a fiche as plain text, one paragraph per section.
pub fn render_fiche_text(fiche: &MemoFiche) -> String {
    let content = &fiche.content;
    let mut sections: Vec<String> = Vec::new();

    let mut header = format!("# {}", content.title.trim());
    let tags: Vec<&str> = [fiche.theme.as_str(), fiche.system.as_str()]
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        header.push('\n');
        header.push_str(&tags.join(" / "));
    }
    sections.push(header);

    sections.push(format!("## Situation patient\n{}", content.patient_situation.trim()));
    push_list(&mut sections, "Questions clés", &content.key_questions);
    push_list(&mut sections, "Signaux d'alerte", &content.red_flags);

    let rec = &content.recommendations;
    push_list(&mut sections, "Traitement principal", &rec.main_treatment);
    push_list(&mut sections, "Produits associés", &rec.associated_products);
    push_list(&mut sections, "Hygiène de vie", &rec.lifestyle_advice);
    push_list(&mut sections, "Conseils alimentaires", &rec.dietary_advice);

    let glossary: Vec<String> = content
        .glossary
        .iter()
        .map(|g| format!("{} : {}", g.term, g.definition))
        .collect();
    push_list(&mut sections, "Glossaire", &glossary);

    let flashcards: Vec<String> = content
        .flashcards
        .iter()
        .map(|f| format!("{} → {}", f.question, f.answer))
        .collect();
    push_list(&mut sections, "Points à retenir", &flashcards);

    sections.join("\n\n")
}

fn push_list(sections: &mut Vec<String>, heading: &str, items: &[String]) {
    let items: Vec<&str> = items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .collect();
    if items.is_empty() {
        return;
    }
    let mut out = format!("## {heading}");
    for item in items {
        out.push_str("\n- ");
        out.push_str(item);
    }
    sections.push(out);
}

/// Split `text` into chunks of at most `max_chars` characters, packing whole
/// paragraphs together where possible. Oversized paragraphs are split on
/// whitespace, and oversized words are split outright.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let len = paragraph.chars().count();
        if len > max_chars {
            flush(&mut chunks, &mut current, &mut current_len);
            chunks.extend(split_long(paragraph, max_chars));
            continue;
        }
        let needed = if current.is_empty() { len } else { current_len + 2 + len };
        if needed > max_chars {
            flush(&mut chunks, &mut current, &mut current_len);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += len;
    }
    flush(&mut chunks, &mut current, &mut current_len);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_len: &mut usize) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
    *current_len = 0;
}

fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in paragraph.split_whitespace() {
        let len = word.chars().count();
        if len > max_chars {
            flush(&mut out, &mut current, &mut current_len);
            let chars: Vec<char> = word.chars().collect();
            out.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }
        let needed = if current.is_empty() { len } else { current_len + 1 + len };
        if needed > max_chars {
            flush(&mut out, &mut current, &mut current_len);
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += len;
    }
    flush(&mut out, &mut current, &mut current_len);
    out
}

/// Cosine similarity; `None` when the vectors cannot be compared.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Indices and scores of the `k` candidates most similar to `query`, best
/// first. Candidates with a non-positive or undefined score are dropped.
pub fn top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, c)| cosine_similarity(query, c).map(|s| (i, s)))
        .filter(|(_, s)| *s > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}
