use {
    crate::db::Db,
    anyhow::Result,
    casecrypt_protocol::{
        Resource,
        record::{DECRYPTION_FAILED, owner},
    },
    casecrypt_sdk::{CipherContext, KeyContext, RecordFieldEncryptor},
    serde::Serialize,
    serde_json::Value,
    std::{
        collections::BTreeMap,
        fmt::{self, Display},
    },
    tracing::{info, instrument, warn},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityCounts {
    pub checked: u64,
    pub damaged: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub resources: BTreeMap<Resource, IntegrityCounts>,
    /// Ids of damaged records per resource.
    pub damaged: BTreeMap<Resource, Vec<String>>,
}

impl Display for IntegrityReport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (resource, counts) in &self.resources {
            writeln!(
                f,
                "{resource}: checked {}, damaged {}",
                counts.checked, counts.damaged
            )?;
            for id in self.damaged.get(resource).into_iter().flatten() {
                writeln!(f, "  {id}")?;
            }
        }
        Ok(())
    }
}

/// Decrypts every encrypted record and reports those that have a field
/// that cannot be decrypted or cannot be decrypted at all.
#[instrument(skip_all)]
#[inline]
pub fn check_integrity(db: &Db, ctx: &CipherContext) -> Result<IntegrityReport> {
    let encryptor = RecordFieldEncryptor::new(ctx);
    let mut report = IntegrityReport::default();
    for resource in Resource::ALL {
        let fields = resource.sensitive_fields();
        let mut counts = IntegrityCounts::default();
        let mut damaged = Vec::new();
        for item in db.scan_encrypted(resource)? {
            counts.checked = counts.checked.saturating_add(1);
            let stored = match item {
                Ok(stored) => stored,
                Err(err) => {
                    warn!(%resource, error = %format_args!("{err:#}"), "unreadable record");
                    counts.damaged = counts.damaged.saturating_add(1);
                    continue;
                }
            };
            let intact = owner(&stored.record).is_some_and(|user| {
                encryptor
                    .decrypt_fields(&stored.record, fields, KeyContext::Shared(user))
                    .is_ok_and(|record| {
                        fields
                            .iter()
                            .all(|field| record.get(*field) != Some(&Value::from(DECRYPTION_FAILED)))
                    })
            });
            if !intact {
                warn!(%resource, id = %stored.id, "record failed integrity check");
                counts.damaged = counts.damaged.saturating_add(1);
                damaged.push(stored.id);
            }
        }
        info!(
            %resource,
            checked = counts.checked,
            damaged = counts.damaged,
            "integrity check finished"
        );
        report.resources.insert(resource, counts);
        if !damaged.is_empty() {
            report.damaged.insert(resource, damaged);
        }
    }
    Ok(report)
}
