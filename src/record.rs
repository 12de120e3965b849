//! The structured record recognised from a TIV scan.
//!
//! Every field is a plain `String` and absence is the empty string, never
//! `None`; only the QR payload (`qr_data`) is optional because "no code in
//! the source" is a meaningful, non-error state that decides whether the
//! final PDF gets stamped.
//!
//! The field table is declared once through `vehicle_record!` so the struct,
//! the by-name accessors used for user edits, and the key list sent to the
//! VLM can never drift apart.

use crate::error::TivError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

macro_rules! vehicle_record {
    ($( $field:ident => $hint:literal, )+) => {
        /// The recognised fields of one TIV (Tarjeta de Identificación Vehicular).
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct VehicleRecord {
            $( pub $field: String, )+
            /// Payload of the QR code found in the source, if any.
            pub qr_data: Option<String>,
        }

        /// Field name → extraction hint, in layout order.
        pub const FIELDS: &[(&str, &str)] = &[ $( (stringify!($field), $hint), )+ ];

        impl VehicleRecord {
            /// Read a string field by name.
            pub fn get(&self, name: &str) -> Option<&str> {
                match name {
                    $( stringify!($field) => Some(self.$field.as_str()), )+
                    _ => None,
                }
            }

            pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut String> {
                match name {
                    $( stringify!($field) => Some(&mut self.$field), )+
                    _ => None,
                }
            }
        }
    };
}

vehicle_record! {
    titulo_numero => "Número de Título (layout: top left)",
    fecha => "Fecha de emisión",
    zona_registral => "Zona Registral (e.g. IX)",
    sede_registral => "Sede Registral (e.g. CHICLAYO)",
    partida_registral => "Partida Registral (layout: top right)",
    dua_dam => "DUA / DAM",
    placa => "Placa del vehículo (layout: large text, top right)",
    categoria => "Categoría (e.g. L3)",
    marca => "Marca",
    modelo => "Modelo",
    color => "Color principal",
    numero_vin => "Número de VIN / Chasis",
    numero_serie => "Número de Serie",
    numero_motor => "Número de Motor",
    carroceria => "Tipo de Carrocería",
    potencia => "Potencia (e.g. 9,70@8000)",
    combustible => "Combustible",
    form_rod => "Fórmula Rodante (e.g. 2x1)",
    version => "Versión del modelo",
    anio_fabricacion => "Año de Fabricación",
    anio_modelo => "Año Modelo",
    asientos => "Número de Asientos",
    pasajeros => "Número de Pasajeros",
    ruedas => "Número de Ruedas",
    ejes => "Número de Ejes",
    cilindros => "Número de Cilindros",
    cilindrada => "Cilindrada",
    longitud => "Longitud",
    altura => "Altura",
    ancho => "Ancho",
    peso_bruto => "Peso Bruto",
    peso_neto => "Peso Neto",
    carga_util => "Carga Útil",
    codigo_verificacion => "Código de Verificación (located near the QR code or header)",
}

/// Keys the extraction service is required to fill.
pub const REQUIRED_FIELDS: &[&str] = &["placa", "numero_motor", "numero_serie", "marca", "modelo"];

impl VehicleRecord {
    /// Overwrite a string field by name (a direct user edit).
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), TivError> {
        let slot = self.field_mut(name).ok_or_else(|| TivError::UnknownField {
            name: name.to_string(),
        })?;
        *slot = value.into();
        Ok(())
    }

    /// Build a record from a loosely-typed JSON object.
    ///
    /// `null` becomes "", numbers and booleans become their textual form,
    /// unknown keys are ignored. `qr_data` is never taken from the object:
    /// it only ever comes from the QR decoder.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut record = Self::default();
        for (name, _) in FIELDS {
            let text = match object.get(*name) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(other) => other.to_string(),
            };
            if let Some(slot) = record.field_mut(name) {
                *slot = text;
            }
        }
        record
    }

    /// Required keys that are still empty.
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|name| self.get(name).is_none_or(|v| v.trim().is_empty()))
            .collect()
    }

    /// Iterate `(name, value)` over every string field in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        FIELDS
            .iter()
            .map(move |(name, _)| (*name, self.get(name).unwrap_or_default()))
    }
}

// ── Recogniser status ────────────────────────────────────────────────────

/// The two recognisers that run concurrently against the source raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recognizer {
    /// VLM structured-field extraction.
    Extraction,
    /// QR code decode.
    Code,
}

impl fmt::Display for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognizer::Extraction => f.write_str("AI extraction"),
            Recognizer::Code => f.write_str("QR decode"),
        }
    }
}

/// Outcome of one recogniser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

/// Per-recogniser status, surfaced independently of the join result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecognizerStatuses {
    pub extraction: RecognizerStatus,
    pub code: RecognizerStatus,
}

impl RecognizerStatuses {
    pub fn set(&mut self, recognizer: Recognizer, status: RecognizerStatus) {
        match recognizer {
            Recognizer::Extraction => self.extraction = status,
            Recognizer::Code => self.code = status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_record_is_empty() {
        let r = VehicleRecord::default();
        assert!(r.iter().all(|(_, v)| v.is_empty()));
        assert_eq!(r.qr_data, None);
        assert_eq!(FIELDS.len(), 34);
    }

    #[test]
    fn set_and_get_by_name() {
        let mut r = VehicleRecord::default();
        r.set("placa", "ABC-123").unwrap();
        assert_eq!(r.placa, "ABC-123");
        assert_eq!(r.get("placa"), Some("ABC-123"));
        assert_eq!(r.get("qr_data"), None);
    }

    #[test]
    fn set_unknown_field_fails() {
        let mut r = VehicleRecord::default();
        let err = r.set("wheels", "4").unwrap_err();
        assert!(matches!(err, TivError::UnknownField { ref name } if name == "wheels"));
    }

    #[test]
    fn from_json_object_is_tolerant() {
        let value = json!({
            "placa": "B7X-042",
            "ruedas": 2,
            "version": null,
            "qr_data": "should be ignored",
            "unexpected": "ignored"
        });
        let r = VehicleRecord::from_json_object(value.as_object().unwrap());
        assert_eq!(r.placa, "B7X-042");
        assert_eq!(r.ruedas, "2");
        assert_eq!(r.version, "");
        assert_eq!(r.qr_data, None);
    }

    #[test]
    fn missing_required_lists_empty_keys() {
        let mut r = VehicleRecord::default();
        r.placa = "ABC-123".into();
        r.marca = "HONDA".into();
        r.modelo = "  ".into();
        assert_eq!(r.missing_required(), vec!["numero_motor", "numero_serie", "modelo"]);
    }

    #[test]
    fn statuses_set_independently() {
        let mut s = RecognizerStatuses::default();
        s.set(Recognizer::Code, RecognizerStatus::Failed);
        assert_eq!(s.extraction, RecognizerStatus::Pending);
        assert_eq!(s.code, RecognizerStatus::Failed);
    }
}
