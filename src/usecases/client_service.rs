//! Client lookup and registration against a ModelStore.

use crate::domain::{Client, DomainError};
use crate::ports::{Filter, ModelStore, ModelStoreExt};
use crate::shared::logging;
use crate::utils::hostname::{forwarded_client_ip, KnownHosts};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ClientService {
    store: Arc<dyn ModelStore>,
}

impl ClientService {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self { store }
    }

    /// Persist a new client. Without a hostname nothing is registered and `None` is returned.
    pub async fn register_client(
        &self,
        client_ip: &str,
        hostname: Option<&str>,
        daemon: bool,
    ) -> Result<Option<Client>, DomainError> {
        let Some(hostname) = hostname else {
            info!(client_ip, "client hostname not provided");
            return Ok(None);
        };
        let client = Client::new(Some(hostname), client_ip, daemon);
        self.store.insert(&client).await?;
        info!(client_ip, hostname, client_id = %client.id, "new client registered");
        Ok(Some(client))
    }

    /// First client with this hostname. With `update_activity` it is marked active and saved.
    pub async fn client_by_hostname(
        &self,
        hostname: &str,
        update_activity: bool,
    ) -> Result<Option<Client>, DomainError> {
        let filter = Filter::new().where_eq("hostname", hostname);
        let Some(mut client) = self.store.find_one::<Client>(&filter).await? else {
            return Ok(None);
        };
        if update_activity {
            client.mark_active();
            self.store.save(&mut client).await?;
        }
        Ok(Some(client))
    }

    /// Client by id, marked active and saved.
    pub async fn client_by_id(&self, client_id: &str) -> Result<Option<Client>, DomainError> {
        let Some(mut client) = self.store.get::<Client>(client_id).await? else {
            return Ok(None);
        };
        client.mark_active();
        self.store.save(&mut client).await?;
        Ok(Some(client))
    }

    /// Rename `client` when it reports a different hostname that is not just its IP.
    /// Returns true if the client was updated.
    pub async fn check_client_hostname(
        &self,
        client: Option<&mut Client>,
        hostname: Option<&str>,
    ) -> Result<bool, DomainError> {
        let Some(client) = client else {
            warn!(hostname = ?hostname, "client not found");
            return Ok(false);
        };
        let Some(hostname) = hostname else {
            return Ok(false);
        };
        if hostname == client.ip_address || !client.update_hostname(hostname) {
            return Ok(false);
        }
        self.store.save(client).await?;
        Ok(true)
    }

    /// Every named client, reachable by IP address and by id. Later rows win on a shared IP.
    pub async fn known_hosts(&self) -> Result<KnownHosts, DomainError> {
        let clients = self.store.find_all::<Client>(&Filter::new()).await?;
        Ok(clients
            .into_iter()
            .filter_map(|c| c.hostname.map(|name| (c.ip_address, c.id, name)))
            .flat_map(|(ip, id, name)| [(ip, name.clone()), (id, name)])
            .collect())
    }

    /// Find or register the client behind a request.
    ///
    /// The address is the first `X-Forwarded-For` entry, else the peer address.
    /// A stored IP that differs from the request's is updated. When the request
    /// runs inside [`logging::client_span`], its log lines are tagged with the client.
    pub async fn resolve_client(
        &self,
        forwarded_for: Option<&str>,
        peer: &str,
        hostname: Option<&str>,
    ) -> Result<Option<Client>, DomainError> {
        let client_ip = forwarded_client_ip(forwarded_for, peer);
        let Some(hostname) = hostname else {
            warn!(client_ip = %client_ip, "client hostname not provided");
            return Ok(None);
        };

        let client = match self.client_by_hostname(hostname, true).await? {
            Some(client) => Some(client),
            None => self.register_client(&client_ip, Some(hostname), true).await?,
        };
        let Some(mut client) = client else {
            return Ok(None);
        };

        logging::tag_current_span(client.hostname.as_deref(), Some(&client_ip));
        if client.update_ip(&client_ip) {
            self.store.save(&mut client).await?;
        }
        Ok(Some(client))
    }
}
