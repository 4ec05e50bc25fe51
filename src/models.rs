//! Typed views of the stored JSON documents.
//!
//! Field names follow the stored contract (Portuguese, camelCase), so these
//! round-trip against documents written by other tooling in the same
//! repository. The record codec works on raw `serde_json::Value`; these
//! types are for callers that want structure after decoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One patient record, one file under `pacientes/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paciente {
    pub id: i64,
    pub nome_completo: String,
    #[serde(default)]
    pub cpf: String,
    #[serde(default)]
    pub telefone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub endereco: String,
    #[serde(default)]
    pub observacoes: String,
    #[serde(default)]
    pub atendimentos: Vec<Atendimento>,
    pub criado_em: DateTime<Utc>,
    pub criado_por: String,
    pub criado_por_id: i64,
    #[serde(default)]
    pub criado_por_registro: String,
    pub ultima_atualizacao: DateTime<Utc>,
}

/// One visit entry inside a patient record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Atendimento {
    pub id: i64,
    pub titulo: String,
    pub data: String,
    pub horario: String,
    #[serde(default)]
    pub valor: f64,
    #[serde(default)]
    pub observacoes: String,
    #[serde(default)]
    pub sinais_vitais: BTreeMap<String, String>,
    pub profissional_nome: String,
    #[serde(default)]
    pub profissional_registro: String,
    #[serde(default)]
    pub profissional_estado: String,
    pub profissional_id: i64,
    pub criado_em: DateTime<Utc>,
}

/// One user account inside `usuarios.json`. `senha` is the password hash,
/// opaque to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usuario {
    pub id: i64,
    pub login: String,
    pub senha: String,
    pub nome_completo: String,
    pub tipo_registro: String,
    pub numero_registro: String,
    #[serde(default)]
    pub estado_registro: String,
    pub tipo: String,
}

/// One appointment inside `agendamentos.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agendamento {
    pub id: i64,
    pub paciente_nome: String,
    pub data: String,
    pub horario: String,
    #[serde(default)]
    pub observacoes: String,
    pub profissional_id: i64,
    pub criado_em: DateTime<Utc>,
}
