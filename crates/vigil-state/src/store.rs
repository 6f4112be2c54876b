//! StateStore — redb-backed state persistence for Vigil.
//!
//! Provides typed CRUD operations over hosts, service kinds, host services,
//! and events. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableHandle, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::repository::Repository;
use crate::tables::*;
use crate::types::*;

/// Default schedule given to host services created alongside a new host.
const DEFAULT_SCHEDULE_NUMBER: u32 = 3;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write()?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(HOSTS)?;
        txn.open_table(SERVICES)?;
        txn.open_table(HOST_SERVICES)?;
        txn.open_table(EVENTS)?;
        txn.open_table(SEQUENCES)?;
        txn.commit()?;
        Ok(())
    }

    // ── Generic record access ──────────────────────────────────────

    fn put_record<T: Serialize>(&self, table: RecordTable, id: u64, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            t.insert(id, value.as_slice())?;
        }
        // Keep the allocator ahead of explicitly chosen ids.
        bump_sequence(&txn, table.name(), id)?;
        txn.commit()?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, table: RecordTable, id: u64) -> StateResult<Option<T>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        match t.get(id)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn list_records<T: DeserializeOwned>(&self, table: RecordTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        let mut results = Vec::new();
        for entry in t.iter()? {
            let (_, value) = entry?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Service kinds ──────────────────────────────────────────────

    /// Insert or update a service kind.
    pub fn put_service(&self, svc: &Service) -> StateResult<()> {
        self.put_record(SERVICES, svc.id, svc)?;
        debug!(service_id = svc.id, name = %svc.service_name, "service stored");
        Ok(())
    }

    pub fn get_service(&self, id: ServiceId) -> StateResult<Option<Service>> {
        self.get_record(SERVICES, id)
    }

    pub fn list_services(&self) -> StateResult<Vec<Service>> {
        self.list_records(SERVICES)
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert or update a host under its existing id.
    pub fn put_host(&self, host: &Host) -> StateResult<()> {
        self.put_record(HOSTS, host.id, host)?;
        debug!(host_id = host.id, "host stored");
        Ok(())
    }

    /// Insert a new host with a freshly allocated id.
    ///
    /// One pending, inactive host service is created for every known service
    /// kind, checked every 3 minutes once activated.
    pub fn insert_host(&self, host: &Host) -> StateResult<Host> {
        let now = epoch_secs();
        let txn = self.db.begin_write()?;
        let mut stored = host.clone();
        {
            stored.id = next_id(&txn, HOSTS.name())?;
            if stored.created_at == 0 {
                stored.created_at = now;
            }
            stored.updated_at = now;

            let services: Vec<Service> = {
                let t = txn.open_table(SERVICES)?;
                let mut services = Vec::new();
                for entry in t.iter()? {
                    let (_, value) = entry?;
                    services.push(decode(value.value())?);
                }
                services
            };

            let value = serde_json::to_vec(&stored)?;
            let mut hosts = txn.open_table(HOSTS)?;
            hosts.insert(stored.id, value.as_slice())?;

            let mut host_services = txn.open_table(HOST_SERVICES)?;
            for svc in services {
                let hs = HostService {
                    id: next_id(&txn, HOST_SERVICES.name())?,
                    host_id: stored.id,
                    service_id: svc.id,
                    active: false,
                    schedule_number: DEFAULT_SCHEDULE_NUMBER,
                    schedule_unit: ScheduleUnit::Minutes,
                    status: ServiceStatus::Pending,
                    created_at: now,
                    updated_at: now,
                    ..Default::default()
                };
                let value = serde_json::to_vec(&hs)?;
                host_services.insert(hs.id, value.as_slice())?;
            }
        }
        txn.commit()?;
        debug!(host_id = stored.id, name = %stored.host_name, "host inserted");
        Ok(stored)
    }

    pub fn get_host(&self, id: HostId) -> StateResult<Option<Host>> {
        self.get_record(HOSTS, id)
    }

    pub fn list_hosts(&self) -> StateResult<Vec<Host>> {
        self.list_records(HOSTS)
    }

    // ── Host services ──────────────────────────────────────────────

    /// Insert or update a host service under its existing id.
    pub fn put_host_service(&self, hs: &HostService) -> StateResult<()> {
        self.put_record(HOST_SERVICES, hs.id, &stored_row(hs))
    }

    /// Get a host service with its service kind and host name filled in.
    pub fn get_host_service(&self, id: HostServiceId) -> StateResult<Option<HostService>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HOST_SERVICES)?;
        let mut hs: HostService = match table.get(id)? {
            Some(guard) => decode(guard.value())?,
            None => return Ok(None),
        };

        let hosts = txn.open_table(HOSTS)?;
        if let Some(guard) = hosts.get(hs.host_id)? {
            let host: Host = decode(guard.value())?;
            hs.host_name = host.host_name;
        }
        let services = txn.open_table(SERVICES)?;
        if let Some(guard) = services.get(hs.service_id)? {
            hs.service = decode(guard.value())?;
        }
        Ok(Some(hs))
    }

    /// Overwrite an existing host service. Fails with `HostServiceNotFound`
    /// if absent.
    pub fn update_host_service(&self, hs: &HostService) -> StateResult<()> {
        let value = serde_json::to_vec(&stored_row(hs))?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(HOST_SERVICES)?;
            let exists = table.get(hs.id)?.is_some();
            if !exists {
                return Err(StateError::HostServiceNotFound(hs.id));
            }
            table.insert(hs.id, value.as_slice())?;
        }
        txn.commit()?;
        debug!(host_service_id = hs.id, status = %hs.status, "host service updated");
        Ok(())
    }

    /// Set the active flag of the host service binding `service_id` to `host_id`.
    ///
    /// Returns the updated record, or `None` if no such binding exists.
    pub fn set_host_service_active(
        &self,
        host_id: HostId,
        service_id: ServiceId,
        active: bool,
    ) -> StateResult<Option<HostService>> {
        let found = self
            .load_host_services(|hs, _| hs.host_id == host_id && hs.service_id == service_id)?
            .into_iter()
            .next();

        match found {
            Some(mut hs) => {
                hs.active = active;
                hs.updated_at = epoch_secs();
                self.update_host_service(&hs)?;
                Ok(Some(hs))
            }
            None => Ok(None),
        }
    }

    /// All host services, hydrated.
    pub fn list_host_services(&self) -> StateResult<Vec<HostService>> {
        self.load_host_services(|_, _| true)
    }

    pub fn list_host_services_for_host(&self, host_id: HostId) -> StateResult<Vec<HostService>> {
        self.load_host_services(|hs, _| hs.host_id == host_id)
    }

    /// Active host services in `status`, ordered by host name then service name.
    pub fn services_by_status(&self, status: ServiceStatus) -> StateResult<Vec<HostService>> {
        let mut services = self.load_host_services(|hs, _| hs.active && hs.status == status)?;
        services.sort_by(|a, b| {
            a.host_name
                .cmp(&b.host_name)
                .then_with(|| a.service.service_name.cmp(&b.service.service_name))
        });
        Ok(services)
    }

    /// Active host services whose host is also active.
    pub fn services_to_monitor(&self) -> StateResult<Vec<HostService>> {
        self.load_host_services(|hs, host| hs.active && host.is_some_and(|h| h.active))
    }

    /// Count of active host services per status.
    pub fn service_status_counts(&self) -> StateResult<StatusCounts> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HOST_SERVICES)?;
        let mut counts = StatusCounts::default();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let hs: HostService = decode(value.value())?;
            if hs.active {
                counts.record(hs.status);
            }
        }
        Ok(counts)
    }

    /// Scan host services in one read transaction, keep those matching
    /// `filter`, and fill in host name and service kind.
    fn load_host_services<F>(&self, filter: F) -> StateResult<Vec<HostService>>
    where
        F: Fn(&HostService, Option<&Host>) -> bool,
    {
        let txn = self.db.begin_read()?;

        let mut hosts: HashMap<HostId, Host> = HashMap::new();
        let table = txn.open_table(HOSTS)?;
        for entry in table.iter()? {
            let (key, value) = entry?;
            hosts.insert(key.value(), decode(value.value())?);
        }

        let mut services: HashMap<ServiceId, Service> = HashMap::new();
        let table = txn.open_table(SERVICES)?;
        for entry in table.iter()? {
            let (key, value) = entry?;
            services.insert(key.value(), decode(value.value())?);
        }

        let mut results = Vec::new();
        let table = txn.open_table(HOST_SERVICES)?;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let mut hs: HostService = decode(value.value())?;
            let host = hosts.get(&hs.host_id);
            if !filter(&hs, host) {
                continue;
            }
            if let Some(host) = host {
                hs.host_name = host.host_name.clone();
            }
            if let Some(svc) = services.get(&hs.service_id) {
                hs.service = svc.clone();
            }
            results.push(hs);
        }
        Ok(results)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an event. The id (and `created_at`, if unset) are assigned here.
    pub fn insert_event(&self, event: &Event) -> StateResult<EventId> {
        let txn = self.db.begin_write()?;
        let id = next_id(&txn, EVENTS.name())?;
        let mut stored = event.clone();
        stored.id = id;
        if stored.created_at == 0 {
            stored.created_at = epoch_secs();
        }
        let value = serde_json::to_vec(&stored)?;
        {
            let mut table = txn.open_table(EVENTS)?;
            table.insert(id, value.as_slice())?;
        }
        txn.commit()?;
        debug!(event_id = id, host_service_id = stored.host_service_id, "event appended");
        Ok(id)
    }

    /// Most recent events first.
    pub fn list_events(&self, limit: usize) -> StateResult<Vec<Event>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EVENTS)?;
        let mut results = Vec::new();
        for entry in table.iter()?.rev().take(limit) {
            let (_, value) = entry?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Events for one host service, oldest first.
    pub fn list_events_for_host_service(&self, id: HostServiceId) -> StateResult<Vec<Event>> {
        let events: Vec<Event> = self.list_records(EVENTS)?;
        Ok(events
            .into_iter()
            .filter(|e| e.host_service_id == id)
            .collect())
    }
}

impl Repository for StateStore {
    fn get_host_by_id(&self, id: HostId) -> StateResult<Host> {
        self.get_host(id)?.ok_or(StateError::HostNotFound(id))
    }

    fn get_host_service_by_id(&self, id: HostServiceId) -> StateResult<HostService> {
        self.get_host_service(id)?.ok_or(StateError::HostServiceNotFound(id))
    }

    fn update_host_service(&self, hs: &HostService) -> StateResult<()> {
        StateStore::update_host_service(self, hs)
    }

    fn insert_event(&self, event: &Event) -> StateResult<EventId> {
        StateStore::insert_event(self, event)
    }

    fn get_all_service_status_counts(&self) -> StateResult<StatusCounts> {
        self.service_status_counts()
    }

    fn get_services_to_monitor(&self) -> StateResult<Vec<HostService>> {
        self.services_to_monitor()
    }
}

/// The persisted form of a host service. Host name and service kind are
/// filled in from their own tables on read and never stored with the row.
fn stored_row(hs: &HostService) -> HostService {
    HostService {
        host_name: String::new(),
        service: Service::default(),
        ..hs.clone()
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Allocate the next id for `name` inside an open write transaction.
fn next_id(txn: &WriteTransaction, name: &str) -> StateResult<u64> {
    let mut seq = txn.open_table(SEQUENCES)?;
    let current = seq.get(name)?.map(|guard| guard.value()).unwrap_or(0);
    let next = current + 1;
    seq.insert(name, next)?;
    Ok(next)
}

/// Raise the sequence for `name` to at least `id`.
fn bump_sequence(txn: &WriteTransaction, name: &str, id: u64) -> StateResult<()> {
    let mut seq = txn.open_table(SEQUENCES)?;
    let current = seq.get(name)?.map(|guard| guard.value()).unwrap_or(0);
    if id > current {
        seq.insert(name, id)?;
    }
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
