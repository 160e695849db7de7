//! gRPC binding of the metric service.

pub mod interceptors;

use std::sync::Arc;
use tonic::codec::CompressionEncoding;
use tonic::{Request, Response, Status};
use tracing::{debug, error, instrument};

use super::service::{Service, ServiceError};
use crate::model::{self, MetricKind, MetricRecord, MetricUpdate};
use crate::rpc::proto::{
    ListRequest, ListResponse, Metric, PingRequest, PingResponse, UpdatesRequest, UpdatesResponse,
};
use crate::rpc::{Metrics, MetricsServer};

use interceptors::CheckChain;

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Invalid(e) => Status::invalid_argument(e.to_string()),
            ServiceError::NotFound(id) => Status::not_found(format!("metric '{}' not found", id)),
            ServiceError::Unavailable => Status::unavailable("storage is not available"),
            ServiceError::Store(e) => {
                error!("Storage failure: {}", e);
                Status::internal(e.to_string())
            }
        }
    }
}

fn to_model(metric: Metric) -> Result<model::Metric, Status> {
    model::Metric::try_from(metric).map_err(|e| Status::invalid_argument(e.to_string()))
}

pub struct MetricsRpc {
    service: Arc<Service>,
    checks: CheckChain,
}

impl MetricsRpc {
    pub fn new(service: Arc<Service>, checks: CheckChain) -> Self {
        Self { service, checks }
    }

    /// tonic service with gzip enabled in both directions.
    pub fn into_server(self) -> MetricsServer<Self> {
        MetricsServer::new(self)
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip)
    }
}

#[tonic::async_trait]
impl Metrics for MetricsRpc {
    #[instrument(skip_all)]
    async fn updates(
        &self,
        request: Request<UpdatesRequest>,
    ) -> Result<Response<UpdatesResponse>, Status> {
        self.checks.run("Updates", &request)?;
        let batch = request
            .into_inner()
            .metrics
            .into_iter()
            .map(to_model)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Received batch of {} metrics", batch.len());

        self.service.update_batch(batch).await?;
        Ok(Response::new(UpdatesResponse::default()))
    }

    #[instrument(skip_all)]
    async fn update(&self, request: Request<Metric>) -> Result<Response<Metric>, Status> {
        self.checks.run("Update", &request)?;
        let metric = to_model(request.into_inner())?;
        let kind = metric.kind;
        let update = MetricUpdate::try_from(metric).map_err(ServiceError::from)?;
        let record = self.service.update_one(update).await?;
        model::Metric::from_record(&record, kind)
            .map(|m| Response::new(Metric::from(&m)))
            .ok_or_else(|| Status::internal("updated record lost its value"))
    }

    #[instrument(skip_all)]
    async fn value(&self, request: Request<Metric>) -> Result<Response<Metric>, Status> {
        self.checks.run("Value", &request)?;
        let query = request.into_inner();
        let kind: MetricKind = query
            .mtype
            .parse()
            .map_err(|e: model::MetricError| Status::invalid_argument(e.to_string()))?;
        let metric = self.service.get_one(&query.id, kind).await?;
        Ok(Response::new(Metric::from(&metric)))
    }

    #[instrument(skip_all)]
    async fn list(&self, request: Request<ListRequest>) -> Result<Response<ListResponse>, Status> {
        self.checks.run("List", &request)?;
        let records = self.service.get_all().await?;
        let metrics = records
            .iter()
            .flat_map(MetricRecord::to_metrics)
            .map(|m| Metric::from(&m))
            .collect();
        Ok(Response::new(ListResponse { metrics }))
    }

    #[instrument(skip_all)]
    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        self.checks.run("Ping", &request)?;
        self.service.ping().await?;
        Ok(Response::new(PingResponse {}))
    }
}
