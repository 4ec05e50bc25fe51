//! Document store behavior against an in-memory blob host.
//!
//! The host enforces the same optimistic-concurrency contract as the real
//! one: every update must carry the version tag of the content it is based
//! on, and a mismatch is a conflict. Knobs simulate rejected writes and
//! stale reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use prontuario_core::audit::{AuditEntry, AuditSink, RequestContext, MAX_LOG_ENTRIES};
use prontuario_core::cipher::CIPHERTEXT_PREFIX;
use prontuario_core::models::{Agendamento, Paciente, Usuario};
use prontuario_core::store::{APPOINTMENTS_PATH, LOGS_PATH, PATIENTS_FOLDER, USERS_PATH};
use prontuario_core::{
    patient_path, Blob, BlobEntry, BlobError, BlobHost, DocumentStore, FieldCipher, StoreError,
};

struct Stored {
    content: Vec<u8>,
    version: String,
    previous: Option<(Vec<u8>, String)>,
}

#[derive(Default)]
struct MemoryHost {
    files: Mutex<HashMap<String, Stored>>,
    /// Upcoming put calls to reject with a conflict, regardless of version.
    reject_puts: AtomicUsize,
    /// Upcoming reads that see the previous version of the content.
    stale_reads: AtomicUsize,
    put_attempts: AtomicUsize,
}

fn version_of(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[async_trait]
impl BlobHost for MemoryHost {
    async fn get(&self, path: &str) -> Result<Blob, BlobError> {
        let files = self.files.lock().unwrap();
        let stored = files.get(path).ok_or(BlobError::NotFound)?;
        if self.stale_reads.load(Ordering::SeqCst) > 0 {
            if let Some((content, version)) = &stored.previous {
                self.stale_reads.fetch_sub(1, Ordering::SeqCst);
                return Ok(Blob {
                    content: content.clone(),
                    version: version.clone(),
                });
            }
        }
        Ok(Blob {
            content: stored.content.clone(),
            version: stored.version.clone(),
        })
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        version: Option<&str>,
        _message: &str,
    ) -> Result<(), BlobError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject_puts.load(Ordering::SeqCst) > 0 {
            self.reject_puts.fetch_sub(1, Ordering::SeqCst);
            return Err(BlobError::Conflict);
        }
        let mut files = self.files.lock().unwrap();
        let previous = match files.get(path) {
            Some(stored) => {
                if version != Some(stored.version.as_str()) {
                    return Err(BlobError::Conflict);
                }
                Some((stored.content.clone(), stored.version.clone()))
            }
            None => {
                if version.is_some() {
                    return Err(BlobError::Conflict);
                }
                None
            }
        };
        files.insert(
            path.to_string(),
            Stored {
                content: content.to_vec(),
                version: version_of(content),
                previous,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str, version: &str, _message: &str) -> Result<(), BlobError> {
        let mut files = self.files.lock().unwrap();
        let stored = files.get(path).ok_or(BlobError::NotFound)?;
        if stored.version != version {
            return Err(BlobError::Conflict);
        }
        files.remove(path);
        Ok(())
    }

    async fn list(&self, folder: &str) -> Result<Vec<BlobEntry>, BlobError> {
        let prefix = format!("{folder}/");
        let files = self.files.lock().unwrap();
        let mut entries: Vec<BlobEntry> = files
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(|name| BlobEntry {
                name: name.to_string(),
                kind: "file".to_string(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn make_store() -> (Arc<MemoryHost>, Arc<DocumentStore>) {
    let _ = tracing_subscriber::fmt().try_init();
    let host = Arc::new(MemoryHost::default());
    let store = Arc::new(DocumentStore::new(
        host.clone(),
        FieldCipher::new("chave-de-teste"),
    ));
    (host, store)
}

fn sample_patient(name: &str, cpf: &str) -> Paciente {
    Paciente {
        id: 1717171717,
        nome_completo: name.to_string(),
        cpf: cpf.to_string(),
        telefone: "(11) 98888-7777".to_string(),
        email: "paciente@example.com".to_string(),
        endereco: "Rua das Flores, 123".to_string(),
        observacoes: "Alergia a dipirona".to_string(),
        atendimentos: Vec::new(),
        criado_em: Utc::now(),
        criado_por: "Dr. Silva".to_string(),
        criado_por_id: 1,
        criado_por_registro: "CRM: 12345".to_string(),
        ultima_atualizacao: Utc::now(),
    }
}

#[tokio::test]
async fn missing_users_document_defaults_to_empty_list() {
    let (_host, store) = make_store();
    let users: Vec<Usuario> = store.load_list(USERS_PATH).await.unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn missing_patient_document_loads_as_none() {
    let (_host, store) = make_store();
    let patient = store.load_patient("pacientes/ninguem.json").await.unwrap();
    assert!(patient.is_none());
}

#[tokio::test]
async fn save_then_load_round_trips() {
    let (_host, store) = make_store();
    let appointments = vec![Agendamento {
        id: 1,
        paciente_nome: "Maria Silva".to_string(),
        data: "2025-09-01".to_string(),
        horario: "14:30".to_string(),
        observacoes: "Retorno".to_string(),
        profissional_id: 1,
        criado_em: Utc::now(),
    }];
    store
        .save_document(APPOINTMENTS_PATH, &appointments, "Novo agendamento")
        .await
        .unwrap();
    let loaded: Vec<Agendamento> = store.load_list(APPOINTMENTS_PATH).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].paciente_nome, "Maria Silva");
    assert_eq!(loaded[0].horario, "14:30");
}

#[tokio::test(start_paused = true)]
async fn conflict_then_success_retries_once() {
    let (host, store) = make_store();
    host.reject_puts.store(1, Ordering::SeqCst);
    store
        .save_document(USERS_PATH, &json!([{"id": 1}]), "Registro de usuário")
        .await
        .unwrap();
    assert_eq!(host.put_attempts.load(Ordering::SeqCst), 2);
    let users: Vec<Value> = store.load_list(USERS_PATH).await.unwrap();
    assert_eq!(users, vec![json!({"id": 1})]);
}

#[tokio::test(start_paused = true)]
async fn second_conflict_surfaces_write_conflict() {
    let (host, store) = make_store();
    host.reject_puts.store(2, Ordering::SeqCst);
    let err = store
        .save_document(USERS_PATH, &json!([]), "Registro de usuário")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::WriteConflict));
    // Exactly one retry, never more.
    assert_eq!(host.put_attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_reader_gets_write_conflict_and_document_stays_intact() {
    let (host, store) = make_store();
    let first = json!([{"id": 1, "login": "drsilva"}]);
    let second = json!([{"id": 1, "login": "drsilva"}, {"id": 2, "login": "drcosta"}]);
    store
        .save_document(USERS_PATH, &first, "Registro inicial")
        .await
        .unwrap();
    store
        .save_document(USERS_PATH, &second, "Segundo usuário")
        .await
        .unwrap();

    // A concurrent caller whose reads keep seeing the pre-update content
    // bases both of its write attempts on a stale tag.
    host.stale_reads.store(2, Ordering::SeqCst);
    let err = store
        .save_document(USERS_PATH, &json!([{"id": 3}]), "Escrita concorrente")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::WriteConflict));

    // The losing writer must not have corrupted the document.
    let current: Vec<Value> = store.load_list(USERS_PATH).await.unwrap();
    assert_eq!(Value::Array(current), second);
}

#[tokio::test]
async fn delete_document_requires_existence() {
    let (_host, store) = make_store();
    store
        .save_document("pacientes/teste.json", &json!({"id": 1}), "Cadastro")
        .await
        .unwrap();
    store
        .delete_document("pacientes/teste.json", "Exclusão de paciente")
        .await
        .unwrap();
    assert!(store
        .load_document::<Value>("pacientes/teste.json")
        .await
        .unwrap()
        .is_none());

    let err = store
        .delete_document("pacientes/teste.json", "Exclusão repetida")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn list_entity_files_filters_to_json() {
    let (host, store) = make_store();
    for path in ["pacientes/a.json", "pacientes/b.json"] {
        host.put(path, b"{}", None, "seed").await.unwrap();
    }
    host.put("pacientes/leia-me.txt", b"notas", None, "seed")
        .await
        .unwrap();
    let entries = store.list_entity_files(PATIENTS_FOLDER).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.json", "b.json"]);
}

#[tokio::test]
async fn listing_a_missing_folder_is_empty_not_an_error() {
    let (_host, store) = make_store();
    assert!(store.list_entity_files(PATIENTS_FOLDER).await.unwrap().is_empty());
}

#[tokio::test]
async fn registered_patient_is_encrypted_at_rest_and_readable_after_reload() {
    let (host, store) = make_store();
    let patient = sample_patient("Maria Silva", "123.456.789-00");
    let path = patient_path(&patient.nome_completo);
    assert_eq!(path, "pacientes/maria-silva.json");

    let record = serde_json::to_value(&patient).unwrap();
    store
        .save_patient(&path, &record, "Cadastro de paciente")
        .await
        .unwrap();

    // At rest the national ID must not be the plaintext value.
    let raw = host.get(&path).await.unwrap();
    let stored: Value = serde_json::from_slice(&raw.content).unwrap();
    let stored_cpf = stored["cpf"].as_str().unwrap();
    assert_ne!(stored_cpf, "123.456.789-00");
    assert!(stored_cpf.starts_with(CIPHERTEXT_PREFIX));

    // Reloading through the store decrypts back to the exact original.
    let loaded = store.load_patient(&path).await.unwrap().unwrap();
    let loaded: Paciente = serde_json::from_value(loaded).unwrap();
    assert_eq!(loaded.cpf, "123.456.789-00");
    assert_eq!(loaded.nome_completo, "Maria Silva");
}

#[tokio::test]
async fn users_list_encrypts_registration_numbers_at_rest() {
    let (host, store) = make_store();
    let user = Usuario {
        id: 1,
        login: "drsilva".to_string(),
        senha: "$2b$10$hash".to_string(),
        nome_completo: "Dr. Silva".to_string(),
        tipo_registro: "CRM".to_string(),
        numero_registro: "12345-SP".to_string(),
        estado_registro: "SP".to_string(),
        tipo: "Administrador".to_string(),
    };
    let users = vec![serde_json::to_value(&user).unwrap()];
    store
        .save_users(&users, "Registro de novo usuário")
        .await
        .unwrap();

    let raw = host.get(USERS_PATH).await.unwrap();
    let stored: Vec<Value> = serde_json::from_slice(&raw.content).unwrap();
    assert!(stored[0]["numeroRegistro"]
        .as_str()
        .unwrap()
        .starts_with(CIPHERTEXT_PREFIX));
    // Only the registration number is encrypted.
    assert_eq!(stored[0]["senha"], json!("$2b$10$hash"));

    let loaded = store.load_users().await.unwrap();
    let loaded: Usuario = serde_json::from_value(loaded[0].clone()).unwrap();
    assert_eq!(loaded.numero_registro, "12345-SP");
}

#[tokio::test]
async fn audit_append_records_entry_with_request_metadata() {
    let (_host, store) = make_store();
    let sink = AuditSink::new(store.clone());
    let ctx = RequestContext {
        ip: Some("::1".to_string()),
        user_agent: Some(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
        ),
    };
    sink.append("login", "drsilva", "Login realizado", Some(&ctx))
        .await;

    let entries: Vec<AuditEntry> = store.load_list(LOGS_PATH).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].acao, "login");
    assert_eq!(entries[0].usuario, "drsilva");
    assert_eq!(entries[0].ip, "localhost");
    assert_eq!(entries[0].navegador, "Chrome");
    assert_eq!(entries[0].so, "Windows");
    assert_eq!(entries[0].dispositivo, "Desktop");
}

#[tokio::test]
async fn audit_log_is_capped_at_the_most_recent_entries() {
    let (_host, store) = make_store();
    let sink = AuditSink::new(store.clone());

    let mut seed: Vec<Value> = Vec::with_capacity(MAX_LOG_ENTRIES);
    for i in 0..MAX_LOG_ENTRIES {
        seed.push(json!({
            "timestamp": "2025-01-01T00:00:00.000Z",
            "acao": "listagem_pacientes",
            "usuario": "drsilva",
            "detalhes": format!("entry-{i}"),
            "ip": "sistema",
            "navegador": "Desconhecido",
            "so": "Desconhecido",
            "dispositivo": "Desktop",
            "userAgent": "",
            "dataHora": "01/01/2025, 00:00:00",
        }));
    }
    store
        .save_document(LOGS_PATH, &seed, "Seed de logs")
        .await
        .unwrap();

    sink.append("login", "drsilva", "entrada mais recente", None)
        .await;

    let entries: Vec<AuditEntry> = store.load_list(LOGS_PATH).await.unwrap();
    assert_eq!(entries.len(), MAX_LOG_ENTRIES);
    // Exactly the oldest entry was dropped.
    assert_eq!(entries[0].detalhes, "entry-1");
    assert_eq!(entries.last().unwrap().detalhes, "entrada mais recente");
}

#[tokio::test(start_paused = true)]
async fn audit_append_absorbs_store_failures() {
    let (host, store) = make_store();
    let sink = AuditSink::new(store.clone());
    host.reject_puts.store(2, Ordering::SeqCst);
    // Must not panic or propagate the conflict.
    sink.append("login", "drsilva", "Login realizado", None).await;
    let entries: Vec<AuditEntry> = store.load_list(LOGS_PATH).await.unwrap();
    assert!(entries.is_empty());
}
