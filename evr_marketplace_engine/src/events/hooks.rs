use std::sync::Arc;

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderCompletedEvent,
    OrderPaidEvent,
    SaleRecordedEvent,
    SaleReversedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub sale_recorded_producer: Vec<EventProducer<SaleRecordedEvent>>,
    pub order_completed_producer: Vec<EventProducer<OrderCompletedEvent>>,
    pub sale_reversed_producer: Vec<EventProducer<SaleReversedEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_sale_recorded: Option<EventHandler<SaleRecordedEvent>>,
    pub on_order_completed: Option<EventHandler<OrderCompletedEvent>>,
    pub on_sale_reversed: Option<EventHandler<SaleReversedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_sale_recorded = hooks.on_sale_recorded.map(|f| EventHandler::new(buffer_size, f));
        let on_order_completed = hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_sale_reversed = hooks.on_sale_reversed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_sale_recorded, on_order_completed, on_sale_reversed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_sale_recorded {
            result.sale_recorded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_completed {
            result.order_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_sale_reversed {
            result.sale_reversed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_sale_recorded {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_sale_reversed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_sale_recorded: Option<Handler<SaleRecordedEvent>>,
    pub on_order_completed: Option<Handler<OrderCompletedEvent>>,
    pub on_sale_reversed: Option<Handler<SaleReversedEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_sale_recorded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SaleRecordedEvent) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_sale_recorded = Some(Arc::new(f));
        self
    }

    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCompletedEvent) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_sale_reversed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SaleReversedEvent) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_sale_reversed = Some(Arc::new(f));
        self
    }
}
