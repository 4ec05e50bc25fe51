//! Applies the field cipher to the sensitive fields of one entity kind.
//!
//! Field allowlists are static: identity and free-text fields for patients
//! (including the notes fields of every visit entry), the professional
//! registration number for users. Everything else is stored as-is.

use serde_json::{Map, Value};

use crate::cipher::FieldCipher;

/// Entity kinds with distinct sensitive-field allowlists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Patient,
    User,
}

const PATIENT_FIELDS: &[&str] = &["cpf", "telefone", "email", "endereco", "observacoes"];
const VISIT_FIELDS: &[&str] = &["descricao", "observacoes"];
const USER_FIELDS: &[&str] = &["numeroRegistro"];

// Visit history lives under `atendimentos`; `historicoMedico` is the name
// used by records migrated from before the visits rework.
const PATIENT_NESTED: &[(&str, &[&str])] = &[
    ("atendimentos", VISIT_FIELDS),
    ("historicoMedico", VISIT_FIELDS),
];
const USER_NESTED: &[(&str, &[&str])] = &[];

/// Returns a copy of `record` with its sensitive fields encrypted.
/// The input is never mutated. Missing, empty and non-string fields are
/// skipped; array fields are mapped element-wise.
pub fn encode_record(cipher: &FieldCipher, kind: RecordKind, record: &Value) -> Value {
    transform(cipher, kind, record, &|c, s| c.encrypt_field(s))
}

/// Exact inverse field set of [`encode_record`]. Decoding a record that was
/// never encoded is harmless: plaintext values pass through the cipher
/// unchanged.
pub fn decode_record(cipher: &FieldCipher, kind: RecordKind, record: &Value) -> Value {
    transform(cipher, kind, record, &|c, s| c.decrypt_field(s))
}

fn allowlists(kind: RecordKind) -> (&'static [&'static str], &'static [(&'static str, &'static [&'static str])]) {
    match kind {
        RecordKind::Patient => (PATIENT_FIELDS, PATIENT_NESTED),
        RecordKind::User => (USER_FIELDS, USER_NESTED),
    }
}

fn transform(
    cipher: &FieldCipher,
    kind: RecordKind,
    record: &Value,
    apply: &dyn Fn(&FieldCipher, &str) -> String,
) -> Value {
    let Some(obj) = record.as_object() else {
        return record.clone();
    };
    let mut out = obj.clone();
    let (top_fields, nested) = allowlists(kind);

    for field in top_fields {
        apply_field(&mut out, field, cipher, apply);
    }
    for (array_field, entry_fields) in nested {
        if let Some(Value::Array(entries)) = out.get_mut(*array_field) {
            for entry in entries.iter_mut() {
                if let Some(entry) = entry.as_object_mut() {
                    for field in *entry_fields {
                        apply_field(entry, field, cipher, apply);
                    }
                }
            }
        }
    }
    Value::Object(out)
}

fn apply_field(
    obj: &mut Map<String, Value>,
    field: &str,
    cipher: &FieldCipher,
    apply: &dyn Fn(&FieldCipher, &str) -> String,
) {
    if let Some(Value::String(current)) = obj.get(field) {
        if !current.is_empty() {
            let replaced = apply(cipher, current);
            obj.insert(field.to_string(), Value::String(replaced));
        }
    }
}
