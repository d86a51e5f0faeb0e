use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use dni_capture_common::extracted::{Age, ExtractedData};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dates::{age_on, format_age, parse_birth_date, DateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    PrimerApellido,
    SegundoApellido,
    Prenombres,
    FechaNacimiento,
    Edad,
    TipoDocumento,
    NumeroDocumento,
    Sexo,
    EstadoCivil,
    GradoInstruccion,
    FechaHoraIngreso,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::PrimerApellido,
        Field::SegundoApellido,
        Field::Prenombres,
        Field::FechaNacimiento,
        Field::Edad,
        Field::TipoDocumento,
        Field::NumeroDocumento,
        Field::Sexo,
        Field::EstadoCivil,
        Field::GradoInstruccion,
        Field::FechaHoraIngreso,
    ];

    /// Wire name, as used by the backend and the submission record.
    pub fn key(self) -> &'static str {
        match self {
            Field::PrimerApellido => "primerApellido",
            Field::SegundoApellido => "segundoApellido",
            Field::Prenombres => "prenombres",
            Field::FechaNacimiento => "fechaNacimiento",
            Field::Edad => "edad",
            Field::TipoDocumento => "tipoDocumento",
            Field::NumeroDocumento => "numeroDocumento",
            Field::Sexo => "sexo",
            Field::EstadoCivil => "estadoCivil",
            Field::GradoInstruccion => "gradoInstruccion",
            Field::FechaHoraIngreso => "fechaHoraIngreso",
        }
    }

    /// Derived fields are never editable by hand.
    pub fn is_computed(self) -> bool {
        matches!(self, Field::Edad | Field::FechaHoraIngreso)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Freshly opened, nothing loaded yet; everything but computed fields is editable.
    Blank,
    /// Populated from the card and locked for review.
    ReadOnly,
    Editing,
}

/// Data-entry form the reviewer checks before saving a record.
#[derive(Debug, Clone)]
pub struct ReviewForm {
    values: BTreeMap<Field, String>,
    auto_filled: BTreeSet<Field>,
    mode: Mode,
    opened_at: NaiveDateTime,
}

impl ReviewForm {
    pub fn new(opened_at: NaiveDateTime) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            Field::FechaHoraIngreso,
            opened_at.format("%Y-%m-%dT%H:%M").to_string(),
        );
        values.insert(Field::TipoDocumento, "DNI".to_string());
        Self {
            values,
            auto_filled: BTreeSet::new(),
            mode: Mode::Blank,
            opened_at,
        }
    }

    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_auto_filled(&self, field: Field) -> bool {
        self.auto_filled.contains(&field)
    }

    pub fn is_editable(&self, field: Field) -> bool {
        !field.is_computed() && self.mode != Mode::ReadOnly
    }

    /// Copy what the backend read into the form, then lock it for review.
    pub fn populate(&mut self, datos: &ExtractedData) {
        let text_fields = [
            (Field::PrimerApellido, &datos.primer_apellido),
            (Field::SegundoApellido, &datos.segundo_apellido),
            (Field::Prenombres, &datos.prenombres),
            (Field::TipoDocumento, &datos.tipo_documento),
            (Field::NumeroDocumento, &datos.numero_documento),
            (Field::Sexo, &datos.sexo),
            (Field::GradoInstruccion, &datos.grado_instruccion),
        ];
        for (field, value) in text_fields {
            if let Some(v) = non_blank(value) {
                self.values.insert(field, v.to_string());
            }
        }

        if let Some(v) = non_blank(&datos.estado_civil) {
            self.values.insert(Field::EstadoCivil, v.to_uppercase());
        }

        if let Some(raw) = non_blank(&datos.fecha_nacimiento) {
            if let Err(e) = self.apply_birth_date(raw) {
                warn!(error = %e, raw, "birth date kept as read, age not computed");
                self.values.insert(Field::FechaNacimiento, raw.to_string());
            }
        }

        // Age read off the card wins over the computed one.
        if let Some(years) = datos.edad.as_ref().and_then(Age::years) {
            self.values.insert(Field::Edad, format_age(years));
        }

        self.auto_filled = self
            .values
            .iter()
            .filter(|(field, value)| {
                !value.is_empty() && !field.is_computed() && **field != Field::TipoDocumento
            })
            .map(|(field, _)| *field)
            .collect();

        info!(
            fields = datos.filled_fields(),
            auto_filled = self.auto_filled.len(),
            "review form populated"
        );
        self.mode = Mode::ReadOnly;
    }

    /// Switch between read-only review and manual editing.
    pub fn toggle_edit(&mut self) -> Mode {
        self.mode = match self.mode {
            Mode::Editing => Mode::ReadOnly,
            Mode::ReadOnly | Mode::Blank => Mode::Editing,
        };
        debug!(mode = ?self.mode, "edit mode toggled");
        self.mode
    }

    pub fn set(&mut self, field: Field, value: &str) -> Result<(), FormError> {
        if !self.is_editable(field) {
            return Err(FormError::Locked(field.key()));
        }
        if field == Field::FechaNacimiento {
            return self.apply_birth_date(value).map_err(FormError::from);
        }
        self.values.insert(field, value.trim().to_string());
        Ok(())
    }

    fn apply_birth_date(&mut self, raw: &str) -> Result<(), DateError> {
        let birth = parse_birth_date(raw)?;
        self.values
            .insert(Field::FechaNacimiento, birth.format("%Y-%m-%d").to_string());
        match age_on(birth, self.opened_at.date()) {
            Some(years) => {
                self.values.insert(Field::Edad, format_age(years));
            }
            None => {
                self.values.remove(&Field::Edad);
            }
        }
        Ok(())
    }

    pub fn submit(&self) -> FormSubmission {
        let record: BTreeMap<&'static str, String> = Field::ALL
            .iter()
            .map(|f| (f.key(), self.get(*f).to_string()))
            .collect();
        info!(
            numero_documento = self.get(Field::NumeroDocumento),
            "review form submitted"
        );
        FormSubmission { record }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Record produced when the reviewer saves the form; every field is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormSubmission {
    record: BTreeMap<&'static str, String>,
}

impl FormSubmission {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.record.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("field '{0}' is not editable right now")]
    Locked(&'static str),
    #[error(transparent)]
    Date(#[from] DateError),
}
