mod shuffle;

use {
    anyhow::{Context, Result, bail, ensure},
    casecrypt_protocol::{
        Record, Resource, SymmetricKey,
        record::{
            DECRYPTION_ERROR, DECRYPTION_FAILED, ENCRYPTED_PLACEHOLDER, ENCRYPTION_VERSION,
            IS_CLIENT_ENCRYPTED, IS_ENCRYPTED, encrypted_field_name, is_encrypted, owner, record_id,
        },
    },
    casecrypt_sdk::{
        CipherContext, EncryptedResource, KeyMaterialSource, Profile, crypto::Pbkdf2,
    },
    casecrypt_server::{
        BatchMigration, Db, DocumentPipeline, GeneratedFile, check_integrity, setup_logger,
        sweep_plaintext,
    },
    clap::Parser,
    fs_err::{read_dir, write},
    rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom},
    serde_json::{Value, json},
    shuffle::{corrupt_envelope, random_record, random_text, with_id},
    std::{collections::BTreeMap, sync::Arc},
    tempfile::TempDir,
    tracing::info,
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Seed of the scenario; random if omitted.
    #[clap(long)]
    seed: Option<u64>,
    /// Plaintext records seeded per resource.
    #[clap(long, default_value_t = 40)]
    records: usize,
    /// PBKDF2 iterations; lower than production to keep runs short.
    #[clap(long, default_value_t = 1_000)]
    kdf_iterations: u32,
    #[clap(long, default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(&args.log_filter)?;
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed, "starting scenario");
    run(seed, args.records, args.kdf_iterations)
        .await
        .with_context(|| format!("scenario failed with seed {seed}"))?;
    info!("scenario passed");
    Ok(())
}

const USERS: &[&str] = &["u1", "u2", "u3", "u4"];

/// What a record should look like when its owner reads it back.
#[derive(Debug)]
enum Expected {
    Readable(Record),
    Annotated,
}

async fn run(seed: u64, records: usize, kdf_iterations: u32) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let ctx = KeyMaterialSource {
        master_key: Some(SymmetricKey::generate()?.to_unmasked_hex()),
        document_key: Some(SymmetricKey::generate()?.to_unmasked_hex()),
        profile: Profile::Test,
    }
    .resolve()?
    .with_kdf(Pbkdf2::with_iterations(kdf_iterations));
    let ctx = Arc::new(ctx);
    let db = Db::temporary()?;

    // Legacy plaintext data, some of it without an owner.
    let mut expected: BTreeMap<(Resource, String), Expected> = BTreeMap::new();
    let mut ownerless = BTreeMap::<Resource, u64>::new();
    for resource in Resource::ALL {
        for index in 0..records {
            let id = format!("legacy-{index}");
            let user = if rng.random_bool(0.1) {
                *ownerless.entry(resource).or_default() += 1;
                None
            } else {
                USERS.choose(&mut rng).copied()
            };
            let record = with_id(random_record(&mut rng, resource, user), id.clone());
            db.put_raw(resource, &record)?;
            if user.is_some() {
                let mut readable = record;
                readable.insert(IS_ENCRYPTED.into(), json!(true));
                readable.insert(ENCRYPTION_VERSION.into(), json!("1.0"));
                expected.insert((resource, id), Expected::Readable(readable));
            }
        }
    }

    // New records written through the wrapper are encrypted from the start.
    for resource in Resource::ALL {
        let wrapper = EncryptedResource::new(&db, resource, &ctx);
        for _ in 0..records / 4 {
            let Some(user) = USERS.choose(&mut rng).copied() else {
                bail!("no users");
            };
            let created = wrapper.create(user, &random_record(&mut rng, resource, None))?;
            ensure!(created.get(IS_CLIENT_ENCRYPTED) == Some(&json!(true)));
            let id = record_id(&created).context("created record has no id")?.to_owned();
            expected.insert((resource, id), Expected::Readable(created));
        }
    }

    // Migration encrypts each eligible record exactly once.
    let first = BatchMigration::new(&db, &ctx)?.run()?;
    info!(report = %first, "first migration");
    for resource in Resource::ALL {
        let counts = first.resources.get(&resource).copied().unwrap_or_default();
        let failed = ownerless.get(&resource).copied().unwrap_or_default();
        ensure!(counts.scanned == u64::try_from(records)?, "{resource}: {counts:?}");
        ensure!(counts.failed == failed, "{resource}: {counts:?}");
        ensure!(counts.encrypted == counts.scanned - failed, "{resource}: {counts:?}");
    }
    let second = BatchMigration::new(&db, &ctx)?.run()?;
    ensure!(second.total().encrypted == 0, "second migration: {second:?}");
    ensure!(second.total().scanned == ownerless.values().sum::<u64>());

    // Nothing sensitive is left in plaintext.
    for resource in Resource::ALL {
        for item in db.scan_encrypted(resource)? {
            let stored = item?;
            for field in resource.sensitive_fields() {
                match stored.record.get(*field) {
                    None | Some(Value::Null) => {}
                    Some(value) => ensure!(
                        value == ENCRYPTED_PLACEHOLDER,
                        "{resource} {} leaks {field}",
                        stored.id
                    ),
                }
            }
        }
    }

    // Damage some records: a bad envelope in one field or an unknown version.
    let mut damaged = 0u64;
    let keys: Vec<_> = expected.keys().cloned().collect();
    for (resource, id) in keys {
        if !rng.random_bool(0.2) {
            continue;
        }
        let Some(mut raw) = db.get_raw(resource, &id)? else {
            bail!("{resource} {id} is missing");
        };
        damaged += 1;
        if rng.random_bool(0.3) {
            raw.insert(ENCRYPTION_VERSION.into(), json!("2.0"));
            expected.insert((resource, id), Expected::Annotated);
        } else {
            let present: Vec<&str> = resource
                .sensitive_fields()
                .iter()
                .copied()
                .filter(|field| raw.contains_key(&encrypted_field_name(field)))
                .collect();
            let Some(field) = present.choose(&mut rng).copied() else {
                damaged -= 1;
                continue;
            };
            let sibling = encrypted_field_name(field);
            let envelope = raw
                .get(&sibling)
                .and_then(Value::as_str)
                .context("envelope is not a string")?;
            let corrupted = corrupt_envelope(&mut rng, envelope);
            raw.insert(sibling, corrupted.into());
            if let Some(Expected::Readable(record)) = expected.get_mut(&(resource, id.clone())) {
                record.insert(field.into(), DECRYPTION_FAILED.into());
            }
        }
        db.put_raw(resource, &raw)?;
    }

    // Every owner reads back exactly what was written, damage included.
    for resource in Resource::ALL {
        let wrapper = EncryptedResource::new(&db, resource, &ctx);
        for user in USERS {
            for row in wrapper.get_many(user)? {
                let id = record_id(&row).context("row without id")?.to_owned();
                match expected.get(&(resource, id.clone())) {
                    Some(Expected::Readable(record)) => {
                        ensure!(&row == record, "{resource} {id}: {row:?} != {record:?}");
                    }
                    Some(Expected::Annotated) => {
                        ensure!(row.get(DECRYPTION_ERROR) == Some(&json!(true)));
                    }
                    None => bail!("unexpected {resource} row {id}"),
                }
                ensure!(owner(&row) == Some(*user));
            }
        }
    }
    for ((resource, id), _) in expected.iter().filter(|(_, e)| matches!(e, Expected::Readable(_))) {
        let raw = db.get_raw(*resource, id)?.context("record disappeared")?;
        ensure!(is_encrypted(&raw), "{resource} {id} is not encrypted");
    }

    let integrity = check_integrity(&db, &ctx)?;
    ensure!(
        integrity
            .resources
            .values()
            .map(|counts| counts.damaged)
            .sum::<u64>()
            == damaged,
        "integrity check: {integrity:?}, expected {damaged} damaged"
    );

    run_documents(&mut rng, &ctx, &db).await
}

async fn run_documents(rng: &mut StdRng, ctx: &Arc<CipherContext>, db: &Db) -> Result<()> {
    let dir = TempDir::new()?;
    let pipeline = DocumentPipeline::new(Arc::clone(ctx), db.clone(), dir.path().join("docs"), true)?;
    let mut files = Vec::new();
    for index in 0..5 {
        let name = format!("document-{index}.pdf");
        let content = random_text(rng, 20_000).into_bytes();
        let created = pipeline
            .create(
                "u1".into(),
                random_record(rng, Resource::Documents, None),
                GeneratedFile {
                    name: name.clone(),
                    content: content.clone(),
                },
            )
            .await?;
        ensure!(created.file.encrypted && created.file.plaintext_removed);
        files.push((name, content));
    }
    for entry in read_dir(pipeline.root())? {
        let path = entry?.path();
        ensure!(
            path.extension().is_some_and(|ext| ext == "enc"),
            "unexpected file {}",
            path.display()
        );
    }
    for (name, content) in &files {
        ensure!(&pipeline.read_file(name.clone()).await? == content);
    }

    // A plaintext copy that survived encryption is swept; the artifact stays.
    let (name, content) = files.first().context("no files")?;
    write(pipeline.root().join(name), content)?;
    let report = sweep_plaintext(pipeline.root(), &ctx.files())?;
    ensure!(report.removed == 1 && report.kept == 0, "{report:?}");
    ensure!(&pipeline.read_file(name.clone()).await? == content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_seed() {
        run(7, 20, 1_000).await.unwrap();
    }
}
