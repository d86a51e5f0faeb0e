use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Fields the OCR backend read off the identity card (`datos` in the response).
///
/// Every field is optional; the backend only sends what it managed to read.
/// Keys this type does not know about, explicit `null`s and values of an
/// unexpected type are kept in `extra`, so the object serializes back to
/// exactly what the backend sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct ExtractedData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primer_apellido: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segundo_apellido: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prenombres: Option<String>,
    /// `YYYY-MM-DD` or `DD MM YYYY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_nacimiento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edad: Option<Age>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_documento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_documento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sexo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estado_civil: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grado_instruccion: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for ExtractedData {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            primer_apellido: take_field(&mut map, "primerApellido"),
            segundo_apellido: take_field(&mut map, "segundoApellido"),
            prenombres: take_field(&mut map, "prenombres"),
            fecha_nacimiento: take_field(&mut map, "fechaNacimiento"),
            edad: take_field(&mut map, "edad"),
            tipo_documento: take_field(&mut map, "tipoDocumento"),
            numero_documento: take_field(&mut map, "numeroDocumento"),
            sexo: take_field(&mut map, "sexo"),
            estado_civil: take_field(&mut map, "estadoCivil"),
            grado_instruccion: take_field(&mut map, "gradoInstruccion"),
            extra: map,
        }
    }
}

/// Move `key` out of `map` when it holds a `T`. Anything else stays put.
fn take_field<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = map.get(key).filter(|v| !v.is_null())?;
    match T::deserialize(value) {
        Ok(parsed) => {
            map.remove(key);
            Some(parsed)
        }
        Err(e) => {
            debug!(key, error = %e, "unexpected value kept as sent");
            None
        }
    }
}

impl ExtractedData {
    /// Number of known fields that carry a non-blank value.
    pub fn filled_fields(&self) -> usize {
        let text = [
            &self.primer_apellido,
            &self.segundo_apellido,
            &self.prenombres,
            &self.fecha_nacimiento,
            &self.tipo_documento,
            &self.numero_documento,
            &self.sexo,
            &self.estado_civil,
            &self.grado_instruccion,
        ];
        let filled_text = text
            .iter()
            .filter(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .count();
        filled_text + usize::from(self.edad.is_some())
    }
}

/// The backend computes the age as an integer, but a string is accepted too.
///
/// A birth year misread into the future gives a negative number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Age {
    Years(i64),
    Text(String),
}

impl Age {
    /// Age in whole years, `None` when negative or not a number.
    pub fn years(&self) -> Option<u32> {
        match self {
            Age::Years(n) => u32::try_from(*n).ok(),
            Age::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Age::Years(n) => write!(f, "{n}"),
            Age::Text(s) => f.write_str(s.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_backend_datos() {
        let datos: ExtractedData = serde_json::from_value(json!({
            "primerApellido": "QUISPE",
            "prenombres": "ANA MARIA",
            "fechaNacimiento": "07 03 1990",
            "edad": 34,
            "numeroDocumento": "12345678-9",
            "sexo": "FEMENINO",
            "fechaHoraIngreso": "2024-05-01T10:30"
        }))
        .unwrap();

        assert_eq!(datos.primer_apellido.as_deref(), Some("QUISPE"));
        assert_eq!(datos.edad, Some(Age::Years(34)));
        assert!(datos.segundo_apellido.is_none());
        assert_eq!(datos.extra["fechaHoraIngreso"], "2024-05-01T10:30");
        assert_eq!(datos.filled_fields(), 6);
    }

    #[test]
    fn unknown_keys_survive_reserialization() {
        let original = json!({
            "numeroDocumento": "12345678",
            "prenombres": "ANA",
            "confianza": 0.82
        });
        let datos: ExtractedData = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&datos).unwrap(), original);
    }

    #[test]
    fn textual_age_is_parsed() {
        let datos: ExtractedData = serde_json::from_value(json!({ "edad": " 41 " })).unwrap();
        let edad = datos.edad.unwrap();
        assert_eq!(edad.years(), Some(41));
        assert_eq!(edad.to_string(), "41");
    }

    #[test]
    fn explicit_nulls_survive_reserialization() {
        let original = json!({
            "numeroDocumento": "12345678",
            "segundoApellido": null,
            "edad": null
        });
        let datos: ExtractedData = serde_json::from_value(original.clone()).unwrap();
        assert!(datos.segundo_apellido.is_none());
        assert!(datos.edad.is_none());
        assert_eq!(serde_json::to_value(&datos).unwrap(), original);
    }

    #[test]
    fn future_birth_year_gives_negative_age_without_years() {
        let datos: ExtractedData =
            serde_json::from_value(json!({ "fechaNacimiento": "01 01 2090", "edad": -66 }))
                .unwrap();
        let edad = datos.edad.clone().unwrap();
        assert_eq!(edad, Age::Years(-66));
        assert_eq!(edad.years(), None);
        assert_eq!(serde_json::to_value(&datos).unwrap()["edad"], -66);
    }

    #[test]
    fn mistyped_field_is_kept_as_sent() {
        let original = json!({ "prenombres": "ANA", "edad": 34.5, "sexo": ["F"] });
        let datos: ExtractedData = serde_json::from_value(original.clone()).unwrap();
        assert!(datos.edad.is_none());
        assert!(datos.sexo.is_none());
        assert_eq!(datos.prenombres.as_deref(), Some("ANA"));
        assert_eq!(serde_json::to_value(&datos).unwrap(), original);
    }
}
