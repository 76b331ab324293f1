//! gRPC surface for the sales intake.
//!
//! Maps the `Sales` service onto `OrderIntake` and translates the error
//! taxonomy into status codes. Infrastructure failures are sanitized to
//! a generic unavailable message; full details are logged internally.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::error;

use crate::orders::{BuyerId, EventId, EventRecord, OrderId, TicketKind, TicketOrder};
use crate::proto;
use crate::proto::sales_server::Sales;
use crate::services::{OrderIntake, PurchaseRequest, SalesError};

/// Sanitized message for store/broker outages.
const SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable";

/// gRPC implementation of the `Sales` service.
pub struct SalesService {
    intake: Arc<OrderIntake>,
}

impl SalesService {
    /// Wrap the intake service.
    pub fn new(intake: Arc<OrderIntake>) -> Self {
        Self { intake }
    }
}

#[tonic::async_trait]
impl Sales for SalesService {
    async fn submit_purchase(
        &self,
        request: Request<proto::PurchaseRequest>,
    ) -> Result<Response<proto::PurchaseAck>, Status> {
        let req = request.into_inner();

        let kind = TicketKind::parse(&req.tipo_ingresso).ok_or_else(|| {
            Status::invalid_argument(format!("unknown tipo_ingresso: {}", req.tipo_ingresso))
        })?;

        let order_id = self
            .intake
            .submit(PurchaseRequest {
                event_id: EventId::new(req.evento_id),
                buyer_id: BuyerId::new(req.usuario_id),
                category: req.categoria,
                quantity: req.quantidade,
                kind,
            })
            .await
            .map_err(into_status)?;

        Ok(Response::new(proto::PurchaseAck {
            pedido_id: order_id.to_string(),
            accepted: true,
        }))
    }

    async fn confirm_order(
        &self,
        request: Request<proto::OrderRef>,
    ) -> Result<Response<proto::OrderReceipt>, Status> {
        let id = OrderId::new(request.into_inner().pedido_id);
        let order = self.intake.confirm(&id).await.map_err(into_status)?;
        Ok(Response::new(receipt(&order)))
    }

    async fn cancel_order(
        &self,
        request: Request<proto::OrderRef>,
    ) -> Result<Response<proto::OrderReceipt>, Status> {
        let id = OrderId::new(request.into_inner().pedido_id);
        let order = self.intake.cancel(&id).await.map_err(into_status)?;
        Ok(Response::new(receipt(&order)))
    }

    async fn get_order(
        &self,
        request: Request<proto::OrderRef>,
    ) -> Result<Response<proto::OrderReceipt>, Status> {
        let id = OrderId::new(request.into_inner().pedido_id);
        let order = self.intake.order(&id).await.map_err(into_status)?;
        Ok(Response::new(receipt(&order)))
    }

    async fn get_availability(
        &self,
        request: Request<proto::AvailabilityRequest>,
    ) -> Result<Response<proto::AvailabilityReply>, Status> {
        let id = EventId::new(request.into_inner().evento_id);
        let event = self.intake.availability(&id).await.map_err(into_status)?;
        Ok(Response::new(availability(&event)))
    }
}

/// Map a pipeline error to a gRPC status.
///
/// Business-rule failures keep their message; infrastructure failures
/// are logged and sanitized.
fn into_status(err: SalesError) -> Status {
    match err {
        SalesError::InsufficientInventory { .. } => Status::failed_precondition(err.to_string()),
        SalesError::InvalidRequest(_) => Status::invalid_argument(err.to_string()),
        SalesError::InvalidReference(_) => Status::not_found(err.to_string()),
        SalesError::DuplicateOrder(_) => Status::already_exists(err.to_string()),
        SalesError::InvalidStateTransition { .. } => Status::failed_precondition(err.to_string()),
        SalesError::Storage(e) => {
            error!(error = %e, "Store failure");
            Status::unavailable(SERVICE_UNAVAILABLE)
        }
        SalesError::Broker(e) => {
            error!(error = %e, "Broker failure");
            Status::unavailable(SERVICE_UNAVAILABLE)
        }
    }
}

fn receipt(order: &TicketOrder) -> proto::OrderReceipt {
    proto::OrderReceipt {
        pedido_id: order.id.to_string(),
        evento_id: order.event_id.to_string(),
        usuario_id: order.buyer_id.to_string(),
        categoria: order.category.clone(),
        quantidade: order.quantity,
        tipo_ingresso: order.kind.as_str().to_string(),
        valor_unitario: order.unit_price,
        valor_total: order.total,
        status: order.status.as_str().to_string(),
        data_hora: order.created_at.to_rfc3339(),
    }
}

fn availability(event: &EventRecord) -> proto::AvailabilityReply {
    proto::AvailabilityReply {
        evento_id: event.id.to_string(),
        nome: event.name.clone(),
        status: event.status.as_str().to_string(),
        restante: event.remaining,
        categorias: event
            .categories
            .iter()
            .map(|c| proto::CategoryAvailability {
                nome: c.name.clone(),
                preco_unitario: c.unit_price,
                restante: c.remaining,
            })
            .collect(),
    }
}
