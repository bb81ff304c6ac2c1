// src/parse.rs

use serde::Deserialize;
use serde::Serialize;

/// All fields we read off the front of a medication box.
///
/// Every field defaults to an empty string; a label that never shows up in
/// the model's reply simply leaves its field empty. `stripe` holds whatever
/// text followed `TARJA:` verbatim ("TV", "TP", "VL" or anything else the
/// model produced) — classification happens only at display time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MedicationRecord {
    pub name: String,
    pub active_ingredient: String,
    pub dosage: String,
    pub quantity: String,
    pub laboratory: String,
    pub stripe: String,
}

impl MedicationRecord {
    /// How many of the six fields came back non-empty.
    pub fn coverage(&self) -> (usize, usize) {
        let total = 6;
        let filled = [
            &self.name,
            &self.active_ingredient,
            &self.dosage,
            &self.quantity,
            &self.laboratory,
            &self.stripe,
        ]
        .iter()
        .filter(|f| !f.is_empty())
        .count();
        (filled, total)
    }

    /// Human-readable stripe classification for display.
    pub fn stripe_label(&self) -> &'static str {
        match self.stripe.as_str() {
            "TV" => "Tarja Vermelha",
            "TP" => "Tarja Preta",
            "VL" => "Venda Livre",
            _ => "Não identificado",
        }
    }

    /// Render the record back into the labelled line format the default
    /// instruction asks the model for.
    pub fn to_reply_text(&self) -> String {
        format!(
            "NOME: {}\nPRINCIPIO ATIVO: {}\nDOSAGEM: {}\nQUANTIDADE: {}\nLABORATORIO: {}\nTARJA: {}",
            self.name,
            self.active_ingredient,
            self.dosage,
            self.quantity,
            self.laboratory,
            self.stripe,
        )
    }
}

/// Parse a free-text model reply into a `MedicationRecord`.
///
/// Line-by-line substring scan: each non-blank line is checked against the
/// six labels in a fixed order and the first matching label claims the line.
/// The value is everything after the first occurrence of the label, trimmed.
/// Labels are matched anywhere in the line, not just at the start, and a
/// label repeated on a later line overwrites the earlier value. Lines that
/// match nothing are ignored. This never fails — a reply with no labels at
/// all yields an all-empty record.
pub fn parse_reply(content: &str) -> MedicationRecord {
    let mut record = MedicationRecord::default();

    for line in content.split('\n').filter(|l| !l.trim().is_empty()) {
        if let Some(value) = value_after(line, "NOME:") {
            record.name = value;
        } else if let Some(value) = value_after(line, "PRINCIPIO ATIVO:") {
            record.active_ingredient = value;
        } else if let Some(value) = value_after(line, "DOSAGEM:") {
            record.dosage = value;
        } else if let Some(value) = value_after(line, "QUANTIDADE:") {
            record.quantity = value;
        } else if let Some(value) = value_after(line, "LABORATORIO:") {
            record.laboratory = value;
        } else if let Some(value) = value_after(line, "TARJA:") {
            record.stripe = value;
        }
    }

    record
}

fn value_after(line: &str, label: &str) -> Option<String> {
    line.split_once(label)
        .map(|(_, rest)| rest.trim().to_string())
}
