//! Prompts for VLM-based TIV field extraction.
//!
//! The prompt carries three things: where fields sit on the card (layout
//! heuristics), how blank or ambiguous values must be written (validation
//! rules), and the exact JSON keys to return. The key list is generated from
//! [`crate::record::FIELDS`] so adding a field to the record updates the
//! prompt automatically.

use crate::record::{FIELDS, REQUIRED_FIELDS};

/// Instructions preceding the key list.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"You are an expert in Peruvian vehicle registration documents (Tarjeta de Identificación Vehicular Electrónica — TIV).

TASK
Analyse the attached image of a TIV. Locate each field using the standard TIV layout and return its text in the JSON object described below.

LAYOUT & LOCATION RULES
1. PLACA: printed prominently in the top-right quadrant. Typical formats are "ABC-123" or "1234-AB".
   - Distinguish the digit '0' (zero) from the letter 'O'.
   - Text such as 'M0T0R' is a header ('MOTOR'); never confuse headers with values.
2. QR & SECURITY: the "Código de Verificación" is a numeric or alphanumeric string near the QR code or in the top header.
3. DATOS DEL VEHÍCULO: middle-left block. Contains Marca, Modelo, Color, Motor, VIN, Serie.
4. TECHNICAL SPECS: bottom/right block. Contains weights, dimensions, seats.

VALIDATION RULES
- If a field reads "SIN VERSION", "---" or is blank, return an empty string.
- POTENCIA: keep the full format including RPM when present (e.g. "9.70@8000").
- COMBUSTIBLE: normalise to GASOLINA, DIESEL, GLP, GNV, BI-COMBUSTIBLE or ELECTRICO.
- PLACA: must match the standard Peruvian plate format.

OUTPUT FORMAT
- Reply with ONE JSON object and nothing else: no commentary, no ``` fences.
- Every value is a JSON string; use "" for anything you cannot read."#;

/// Build the full extraction prompt, including the key list.
pub fn extraction_prompt() -> String {
    let mut prompt = String::with_capacity(EXTRACTION_INSTRUCTIONS.len() + 2048);
    prompt.push_str(EXTRACTION_INSTRUCTIONS);
    prompt.push_str("\n\nKEYS (name: meaning)\n");
    for (name, hint) in FIELDS {
        prompt.push_str(&format!("- {name}: {hint}\n"));
    }
    prompt.push_str(&format!(
        "\nREQUIRED (never omit, read them with extra care): {}\n",
        REQUIRED_FIELDS.join(", ")
    ));
    prompt
}
