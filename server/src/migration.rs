use {
    crate::db::{Db, StoredRecord},
    anyhow::{Result, anyhow, bail},
    casecrypt_protocol::{Resource, record::owner},
    casecrypt_sdk::{
        CipherContext, ConfigurationError, KeyContext, PlaintextPolicy, RecordFieldEncryptor,
    },
    serde::Serialize,
    std::{
        collections::BTreeMap,
        fmt::{self, Display},
    },
    tracing::{info, instrument, warn},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationCounts {
    pub scanned: u64,
    pub encrypted: u64,
    pub failed: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub resources: BTreeMap<Resource, MigrationCounts>,
}

impl MigrationReport {
    #[must_use]
    #[inline]
    pub fn total(&self) -> MigrationCounts {
        self.resources
            .values()
            .fold(MigrationCounts::default(), |total, counts| MigrationCounts {
                scanned: total.scanned.saturating_add(counts.scanned),
                encrypted: total.encrypted.saturating_add(counts.encrypted),
                failed: total.failed.saturating_add(counts.failed),
            })
    }
}

impl Display for MigrationReport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run {
            "would encrypt"
        } else {
            "encrypted"
        };
        for (resource, counts) in &self.resources {
            writeln!(
                f,
                "{resource}: scanned {}, {verb} {}, failed {}",
                counts.scanned, counts.encrypted, counts.failed
            )?;
        }
        Ok(())
    }
}

/// Encrypts every stored record that is not encrypted yet.
///
/// Each record is encrypted under its owner's shared per-user key, the same
/// key [`casecrypt_sdk::EncryptedResource`] reads it with. A record either
/// gets all its sensitive fields encrypted in one write or is left alone and
/// counted as failed; later runs pick it up again.
#[derive(Debug)]
pub struct BatchMigration<'a> {
    db: &'a Db,
    encryptor: RecordFieldEncryptor<'a>,
    dry_run: bool,
}

impl<'a> BatchMigration<'a> {
    /// Refuses to run unless the master secret is configured explicitly.
    #[inline]
    pub fn new(db: &'a Db, ctx: &'a CipherContext) -> Result<Self, ConfigurationError> {
        ctx.require_configured_master()?;
        Ok(Self {
            db,
            encryptor: RecordFieldEncryptor::new(ctx).with_policy(PlaintextPolicy::Placeholder),
            dry_run: false,
        })
    }

    /// Encrypt in memory only, without writing anything.
    #[must_use]
    #[inline]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[instrument(skip_all, fields(dry_run = self.dry_run))]
    #[inline]
    pub fn run(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            dry_run: self.dry_run,
            resources: BTreeMap::new(),
        };
        for resource in Resource::ALL {
            let counts = self.migrate_resource(resource)?;
            info!(
                %resource,
                scanned = counts.scanned,
                encrypted = counts.encrypted,
                failed = counts.failed,
                "migration finished"
            );
            report.resources.insert(resource, counts);
        }
        if !self.dry_run {
            self.db.flush()?;
        }
        Ok(report)
    }

    fn migrate_resource(&self, resource: Resource) -> Result<MigrationCounts> {
        let mut counts = MigrationCounts::default();
        for item in self.db.scan_unencrypted(resource)? {
            counts.scanned = counts.scanned.saturating_add(1);
            let result = item.and_then(|stored| {
                self.migrate_record(resource, &stored)
                    .map_err(|err| err.context(format!("record {}", stored.id)))
            });
            match result {
                Ok(()) => counts.encrypted = counts.encrypted.saturating_add(1),
                Err(err) => {
                    warn!(%resource, error = %format_args!("{err:#}"), "failed to migrate record");
                    counts.failed = counts.failed.saturating_add(1);
                }
            }
        }
        Ok(counts)
    }

    fn migrate_record(&self, resource: Resource, stored: &StoredRecord) -> Result<()> {
        let user = owner(&stored.record).ok_or_else(|| anyhow!("record has no owner"))?;
        let encrypted = self.encryptor.encrypt_fields(
            &stored.record,
            resource.sensitive_fields(),
            KeyContext::Shared(user),
        )?;
        if self.dry_run {
            return Ok(());
        }
        if !self.db.replace_if_unchanged(resource, stored, &encrypted)? {
            bail!("record was modified during migration");
        }
        Ok(())
    }
}
