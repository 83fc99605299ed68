/// Turns a free-form label (hospital names, table names) into a lowercase
/// ASCII path segment: accents folded, other characters to `_`, runs of `_`
/// collapsed and trimmed.
pub fn sanitize_segment(name: &str) -> String {
    let folded: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            c if c.is_ascii_alphanumeric() => c,
            _ => '_',
        })
        .collect();

    let mut result = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c == '_' && result.ends_with('_') {
            continue;
        }
        result.push(c);
    }

    let result = result.trim_matches('_');
    if result.is_empty() {
        "sin_nombre".to_owned()
    } else {
        result.to_owned()
    }
}
