//! Derived display fields and the placeholder map of the DOCX template.
//!
//! All functions here are pure and total: a missing input yields an empty
//! derived value, never an error. [`TemplateFields`] is recomputed from the
//! current record every time a template is filled and is never edited.

use crate::record::VehicleRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Literal prefixed to the registry zone code.
pub const ZONE_LABEL: &str = "ZONA REGISTRAL N° ";

/// Swap the two halves of a `A-B` title number (`2023-12345` → `12345-2023`).
///
/// The swap is symmetric and unconditional whenever there are exactly two
/// hyphen-separated parts; anything else is returned unchanged.
pub fn invert_title(title: &str) -> String {
    match title.split_once('-') {
        Some((head, tail)) if !tail.contains('-') => format!("{tail}-{head}"),
        _ => title.to_string(),
    }
}

/// The date part of a `"dd/mm/yyyy hh:mm:ss"` timestamp.
pub fn date_only(timestamp: &str) -> String {
    timestamp
        .split_once(' ')
        .map_or(timestamp, |(date, _)| date)
        .to_string()
}

/// `"IX"` → `"ZONA REGISTRAL N° IX"`; empty stays empty.
pub fn full_zone(zone: &str) -> String {
    if zone.is_empty() {
        String::new()
    } else {
        format!("{ZONE_LABEL}{zone}")
    }
}

/// Placeholder name → value, exactly as the template expects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateFields(BTreeMap<&'static str, String>);

impl TemplateFields {
    pub fn from_record(r: &VehicleRecord) -> Self {
        let pairs: [(&'static str, String); 35] = [
            ("Contador", r.codigo_verificacion.clone()),
            ("Placa", r.placa.clone()),
            ("Titulo_Invertido", invert_title(&r.titulo_numero)),
            ("Fecha", r.fecha.clone()),
            ("Zona_Registral_Completa", full_zone(&r.zona_registral)),
            ("Sede_Registral", r.sede_registral.clone()),
            ("Partida_Nro", r.partida_registral.clone()),
            ("DUA", r.dua_dam.clone()),
            ("Titulo_Nro", r.titulo_numero.clone()),
            ("Fecha_Solo", date_only(&r.fecha)),
            ("Cilindrada", r.cilindrada.clone()),
            ("Peso_Bruto", r.peso_bruto.clone()),
            ("Peso_Neto", r.peso_neto.clone()),
            ("Carga_Util", r.carga_util.clone()),
            ("Nro_Cilindros", r.cilindros.clone()),
            ("Longitud", r.longitud.clone()),
            ("Altura", r.altura.clone()),
            ("Ancho", r.ancho.clone()),
            ("Nro_Version", r.version.clone()),
            ("Tipo_Combustible", r.combustible.clone()),
            ("Formula_Rodante", r.form_rod.clone()),
            ("Potencia_Motor", r.potencia.clone()),
            ("Tipo_Carroceria", r.carroceria.clone()),
            ("Nro_Motor", r.numero_motor.clone()),
            ("Nro_Serie", r.numero_serie.clone()),
            ("Nro_VIN", r.numero_vin.clone()),
            ("Color", r.color.clone()),
            ("Nro_Asientos", r.asientos.clone()),
            ("Nro_Pasajeros", r.pasajeros.clone()),
            ("Nro_Ruedas", r.ruedas.clone()),
            ("Nro_Ejes", r.ejes.clone()),
            ("Año_Modelo", r.anio_modelo.clone()),
            ("Modelo", r.modelo.clone()),
            ("Marca", r.marca.clone()),
            ("Categoria", r.categoria.clone()),
        ];
        Self(pairs.into_iter().collect())
    }

    /// Value for a placeholder; unknown placeholders resolve to "".
    pub fn value(&self, placeholder: &str) -> &str {
        self.0.get(placeholder).map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_swaps_two_parts() {
        assert_eq!(invert_title("2023-12345"), "12345-2023");
        assert_eq!(invert_title("12345-2023"), "2023-12345");
        assert_eq!(invert_title("A-B"), "B-A");
    }

    #[test]
    fn invert_leaves_other_shapes_alone() {
        assert_eq!(invert_title(""), "");
        assert_eq!(invert_title("202312345"), "202312345");
        assert_eq!(invert_title("2023-123-45"), "2023-123-45");
    }

    #[test]
    fn invert_handles_empty_halves() {
        assert_eq!(invert_title("-2023"), "2023-");
        assert_eq!(invert_title("2023-"), "-2023");
    }

    #[test]
    fn date_only_cuts_at_first_space() {
        assert_eq!(date_only("15/03/2024 10:22:01"), "15/03/2024");
        assert_eq!(date_only("15/03/2024  extra"), "15/03/2024");
        assert_eq!(date_only("15/03/2024"), "15/03/2024");
        assert_eq!(date_only(""), "");
    }

    #[test]
    fn zone_label() {
        assert_eq!(full_zone(""), "");
        assert_eq!(full_zone("IX"), "ZONA REGISTRAL N° IX");
    }

    #[test]
    fn template_fields_project_record() {
        let mut r = VehicleRecord::default();
        r.titulo_numero = "2024-998877".into();
        r.fecha = "02/01/2024 08:00:00".into();
        r.zona_registral = "II".into();
        r.codigo_verificacion = "00417".into();
        r.anio_modelo = "2024".into();

        let f = TemplateFields::from_record(&r);
        assert_eq!(f.len(), 35);
        assert_eq!(f.value("Titulo_Invertido"), "998877-2024");
        assert_eq!(f.value("Titulo_Nro"), "2024-998877");
        assert_eq!(f.value("Fecha_Solo"), "02/01/2024");
        assert_eq!(f.value("Zona_Registral_Completa"), "ZONA REGISTRAL N° II");
        assert_eq!(f.value("Contador"), "00417");
        assert_eq!(f.value("Año_Modelo"), "2024");
        assert_eq!(f.value("Placa"), "");
        assert_eq!(f.value("NotAPlaceholder"), "");
    }
}
