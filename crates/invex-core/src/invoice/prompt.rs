//! Extraction prompt built from the invoice field schema.

use tracing::warn;

use crate::models::invoice::InvoiceField;

const INSTRUCTIONS: &str = "Vous êtes un assistant qui extrait des informations à partir d'une facture.
Veuillez extraire les informations suivantes et les fournir au format JSON, \
en utilisant exactement les libellés ci-dessous comme clés:";

/// Build the extraction prompt for `text`.
///
/// Text longer than `max_chars` characters is cut on a character boundary
/// (0 = no limit).
pub fn build_prompt(text: &str, max_chars: usize) -> String {
    let (text, truncated) = truncate_chars(text, max_chars);
    if truncated {
        warn!(
            "Invoice text truncated to {} characters for the extraction prompt",
            max_chars
        );
    }

    let mut prompt = String::with_capacity(INSTRUCTIONS.len() + text.len() + 512);
    prompt.push('\n');
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\n");

    for field in InvoiceField::ALL {
        prompt.push_str("- ");
        prompt.push_str(field.key());
        if let Some(hint) = field.hint() {
            prompt.push_str(" (");
            prompt.push_str(hint);
            prompt.push(')');
        }
        prompt.push('\n');
    }

    prompt.push_str("\nTexte de la facture:\n");
    prompt.push_str(text);
    prompt.push('\n');
    prompt
}

/// First `max_chars` characters of `text`, and whether anything was cut.
fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    if max_chars == 0 {
        return (text, false);
    }
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prompt_lists_every_schema_field() {
        let prompt = build_prompt("FACTURE 2024-001", 0);

        for field in InvoiceField::ALL {
            assert!(
                prompt.contains(&format!("- {}", field.key())),
                "prompt is missing {:?}",
                field
            );
        }
        assert!(prompt.contains("- Taux de TVA (multiples, sous forme de liste JSON)"));
        assert!(prompt.ends_with("Texte de la facture:\nFACTURE 2024-001\n"));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("Numéro", 4), ("Numé", true));
        assert_eq!(truncate_chars("Numéro", 6), ("Numéro", false));
        assert_eq!(truncate_chars("Numéro", 0), ("Numéro", false));
    }

    #[test]
    fn test_long_text_is_capped() {
        let text = "é".repeat(100);
        let prompt = build_prompt(&text, 10);
        assert!(prompt.contains(&format!("Texte de la facture:\n{}\n", "é".repeat(10))));
        assert!(!prompt.contains(&"é".repeat(11)));
    }
}
