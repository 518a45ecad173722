//! Placeholder AI actions. No model is wired in; each action echoes the
//! beginning of the text.

const PREVIEW_CHARS: usize = 50;

fn placeholder(text: &str) -> String {
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("[AI結果] {preview}...")
}

pub fn proofread(text: &str) -> String {
    placeholder(text)
}

pub fn summarize(text: &str) -> String {
    placeholder(text)
}

pub fn translate(text: &str) -> String {
    placeholder(text)
}
