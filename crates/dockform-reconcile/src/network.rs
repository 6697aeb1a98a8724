//! Network lifecycle.

use crate::diff::network_verdict;
use crate::error::{EngineResultExt, ReconcileError, Result};
use crate::lifecycle::{ExternalClient, ExternalObservation};
use crate::observe::network_observation;
use crate::volume::non_empty;
use async_trait::async_trait;
use dockform_engine::{Ipam, IpamConfig, NetworkCreateRequest, NetworkOps};
use dockform_resource::network::{
    DEFAULT_IPAM_DRIVER, IpamParameters, NETWORK_KIND, Network, NetworkObservation,
    NetworkParameters,
};
use dockform_resource::Condition;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciles network records.
///
/// The marker is the engine-assigned network ID.
#[derive(Clone)]
pub struct NetworkController {
    engine: Arc<dyn NetworkOps>,
}

impl NetworkController {
    /// Creates a controller.
    #[must_use]
    pub fn new(engine: Arc<dyn NetworkOps>) -> Self {
        Self { engine }
    }
}

/// Builds the engine create request for a network called `name`.
#[must_use]
pub fn network_request(name: &str, params: &NetworkParameters) -> NetworkCreateRequest {
    NetworkCreateRequest {
        name: name.to_string(),
        driver: Some(params.driver_or_default().to_string()),
        internal: params.internal,
        attachable: params.attachable,
        ingress: params.ingress,
        enable_ipv6: params.enable_ipv6,
        ipam: params.ipam.as_ref().map(ipam),
        options: non_empty(&params.options),
        labels: non_empty(&params.labels),
    }
}

fn ipam(params: &IpamParameters) -> Ipam {
    let driver = params
        .driver
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_IPAM_DRIVER.to_string());
    let config: Vec<IpamConfig> = params
        .config
        .iter()
        .map(|pool| IpamConfig {
            subnet: pool.subnet.clone(),
            ip_range: pool.ip_range.clone(),
            gateway: pool.gateway.clone(),
            aux_addresses: non_empty(&pool.aux_addresses),
        })
        .collect();
    Ipam {
        driver: Some(driver),
        config: (!config.is_empty()).then_some(config),
        options: non_empty(&params.options),
    }
}

#[async_trait]
impl ExternalClient for NetworkController {
    type Params = NetworkParameters;
    type Observation = NetworkObservation;

    const KIND: &'static str = NETWORK_KIND;

    async fn observe(&self, record: &mut Network) -> Result<ExternalObservation> {
        let Some(id) = record.external_name().map(str::to_string) else {
            return Ok(ExternalObservation::absent());
        };

        let network = match self.engine.inspect_network(&id).await {
            Ok(network) => network,
            Err(e) if e.is_not_found() => {
                debug!(network_id = %id, "network not found");
                record.status.at_provider = None;
                return Ok(ExternalObservation::absent());
            }
            Err(e) => return Err(ReconcileError::engine("inspect network", &id, e)),
        };

        record.status.at_provider = Some(network_observation(&network));
        record.status.set_condition(Condition::available());
        Ok(ExternalObservation::exists(&network_verdict(
            record.params(),
            &network,
        )))
    }

    async fn create(&self, record: &mut Network) -> Result<()> {
        let name = record
            .params()
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| record.name().to_string());
        let request = network_request(&name, record.params());

        let response = self
            .engine
            .create_network(&request)
            .await
            .during("create network", &name)?;
        if let Some(warning) = response.warning.as_deref().filter(|w| !w.is_empty()) {
            warn!(network = %name, "engine warning: {}", warning);
        }
        record.metadata.set_external_name(&response.id);
        info!(network = %name, network_id = %response.id, "network created");
        Ok(())
    }

    async fn update(&self, record: &mut Network) -> Result<()> {
        debug!(name = %record.name(), "networks cannot be updated in place, ignoring drift");
        Ok(())
    }

    async fn delete(&self, record: &mut Network) -> Result<()> {
        let Some(id) = record.external_name().map(str::to_string) else {
            return Ok(());
        };
        match self.engine.remove_network(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ReconcileError::engine("remove network", &id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_engine::FakeEngine;
    use dockform_resource::ObjectMeta;
    use dockform_resource::network::IpamPool;

    #[test]
    fn test_network_request_maps_ipam() {
        let params = NetworkParameters {
            internal: Some(true),
            ipam: Some(IpamParameters {
                config: vec![IpamPool {
                    subnet: Some("10.10.0.0/24".into()),
                    gateway: Some("10.10.0.1".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        let request = network_request("backend", &params);
        assert_eq!(request.driver.as_deref(), Some("bridge"));
        assert_eq!(request.internal, Some(true));
        let ipam = request.ipam.unwrap();
        assert_eq!(ipam.driver.as_deref(), Some("default"));
        let pools = ipam.config.unwrap();
        assert_eq!(pools[0].subnet.as_deref(), Some("10.10.0.0/24"));
        assert!(pools[0].aux_addresses.is_none());
    }

    #[tokio::test]
    async fn test_create_stores_network_id() {
        let engine = Arc::new(FakeEngine::new());
        let controller = NetworkController::new(engine.clone());
        let mut record = Network::new(ObjectMeta::named("backend"), NetworkParameters::default());

        controller.create(&mut record).await.unwrap();
        let id = record.external_name().unwrap();
        assert_ne!(id, "backend");
        assert_eq!(engine.network_names(), vec!["backend"]);

        let observation = controller.observe(&mut record).await.unwrap();
        assert!(observation.resource_up_to_date);
        assert_eq!(record.status.at_provider.as_ref().unwrap().name, "backend");
    }
}
