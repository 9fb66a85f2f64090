//! Table job registry.
//!
//! Jobs run strictly in registry order. A job's phase is the earliest point
//! at which every table it references has been loaded, so the order is
//! fixed by the foreign keys of the target schema.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use crate::config::MigrationConfig;
use crate::convert::api_key::ApiKeyConverter;
use crate::convert::device::{DeviceConverter, DeviceTagConverter};
use crate::convert::namespace::{MembershipConverter, NamespaceConverter};
use crate::convert::public_key::{PublicKeyConverter, PublicKeyTagConverter};
use crate::convert::session::{ActiveSessionDocument, SessionConverter, SessionEventConverter};
use crate::convert::system::SystemConverter;
use crate::convert::tag::TagConverter;
use crate::convert::user::UserConverter;
use crate::convert::{decode, Converter, TargetRow};
use crate::error::{MigrateError, Result};
use crate::source::{collections, Filter, FindOptions};
use crate::transfer::{self, LoadOptions, LoadStats, TransferContext};

/// Everything a job needs while it runs.
pub struct JobContext<'a> {
    pub transfer: &'a TransferContext,
    pub config: &'a MigrationConfig,
}

/// One unit of the migration: loads exactly one target table.
#[async_trait]
pub trait TableJob: Send + Sync {
    /// Target table name; also the key in `migration_state`.
    fn name(&self) -> &'static str;

    /// Dependency phase, starting at 1.
    fn phase(&self) -> u8;

    async fn run(&self, ctx: &JobContext<'_>) -> Result<LoadStats>;
}

fn load_options(config: &MigrationConfig, bulk: bool) -> LoadOptions {
    if bulk {
        LoadOptions {
            batch_size: config.get_session_events_batch_size(),
            progress_interval: config.get_progress_interval(),
            suspend_triggers: config.get_disable_triggers(),
        }
    } else {
        LoadOptions {
            batch_size: config.get_batch_size(),
            progress_interval: config.get_progress_interval(),
            suspend_triggers: false,
        }
    }
}

/// Job that streams one collection through a converter.
pub struct EntityJob<C> {
    phase: u8,
    converter: C,
    bulk: bool,
}

impl<C: Converter> EntityJob<C> {
    pub fn new(phase: u8, converter: C) -> Self {
        Self {
            phase,
            converter,
            bulk: false,
        }
    }

    /// Load with the high-volume batch size and triggers suspended.
    pub fn bulk(mut self) -> Self {
        self.bulk = true;
        self
    }
}

#[async_trait]
impl<C: Converter> TableJob for EntityJob<C> {
    fn name(&self) -> &'static str {
        <C::Row as TargetRow>::TABLE.name
    }

    fn phase(&self) -> u8 {
        self.phase
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<LoadStats> {
        transfer::load(ctx.transfer, &self.converter, load_options(ctx.config, self.bulk)).await
    }
}

/// Sessions need the set of currently active session UIDs before any
/// session can be converted.
pub struct SessionJob {
    phase: u8,
}

impl SessionJob {
    pub fn new(phase: u8) -> Self {
        Self { phase }
    }
}

/// UIDs listed in `active_sessions`.
pub async fn active_session_uids(ctx: &TransferContext) -> Result<HashSet<String>> {
    let mut cursor = ctx
        .cancellable(ctx.source.find(
            collections::ACTIVE_SESSIONS,
            &Filter::all(),
            FindOptions::default(),
        ))
        .await?;

    let mut uids = HashSet::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(MigrateError::Cancelled),
            item = cursor.next() => item,
        };
        let Some(item) = next else {
            break;
        };
        let doc: ActiveSessionDocument = decode(collections::ACTIVE_SESSIONS, item?)?;
        uids.insert(doc.uid);
    }
    Ok(uids)
}

#[async_trait]
impl TableJob for SessionJob {
    fn name(&self) -> &'static str {
        <<SessionConverter as Converter>::Row as TargetRow>::TABLE.name
    }

    fn phase(&self) -> u8 {
        self.phase
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<LoadStats> {
        let active = active_session_uids(ctx.transfer).await?;
        info!("sessions: {} active sessions", active.len());
        let converter = SessionConverter::new(active);
        transfer::load(ctx.transfer, &converter, load_options(ctx.config, false)).await
    }
}

/// The fixed, phase-ordered job list.
pub fn registry() -> Vec<Box<dyn TableJob>> {
    vec![
        Box::new(EntityJob::new(1, SystemConverter)),
        Box::new(EntityJob::new(2, NamespaceConverter)),
        Box::new(EntityJob::new(3, UserConverter)),
        Box::new(EntityJob::new(3, TagConverter)),
        Box::new(EntityJob::new(4, MembershipConverter)),
        Box::new(EntityJob::new(4, ApiKeyConverter)),
        Box::new(EntityJob::new(4, PublicKeyConverter)),
        Box::new(EntityJob::new(4, DeviceConverter)),
        Box::new(EntityJob::new(5, DeviceTagConverter)),
        Box::new(EntityJob::new(5, PublicKeyTagConverter)),
        Box::new(SessionJob::new(5)),
        Box::new(EntityJob::new(6, SessionEventConverter).bulk()),
    ]
}
