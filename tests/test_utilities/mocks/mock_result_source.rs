use async_trait::async_trait;
use depwatch::prelude::*;
use depwatch::ports::outbound::Delivery;
use std::collections::VecDeque;
use std::sync::Mutex;

/// In-memory delivery channel; nacked and unacked deliveries come back
#[derive(Default)]
pub struct MockInbox {
    pending: Mutex<VecDeque<ResultEnvelope>>,
    in_flight: Mutex<Vec<Delivery>>,
    pub acked: Mutex<Vec<String>>,
}

impl MockInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, envelope: ResultEnvelope) {
        self.pending.lock().unwrap().push_back(envelope);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[async_trait]
impl ResultSource for MockInbox {
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut pending = self.pending.lock().unwrap();
        let mut in_flight = self.in_flight.lock().unwrap();
        let mut deliveries = Vec::new();
        while deliveries.len() < max {
            let Some(envelope) = pending.pop_front() else {
                break;
            };
            let delivery = Delivery {
                receipt: format!("receipt-{}-{}", envelope.message_id, in_flight.len()),
                envelope,
            };
            in_flight.push(delivery.clone());
            deliveries.push(delivery);
        }
        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        self.in_flight
            .lock()
            .unwrap()
            .retain(|delivery| delivery.receipt != receipt);
        self.acked.lock().unwrap().push(receipt.to_string());
        Ok(())
    }

    async fn nack(&self, receipt: &str) -> Result<()> {
        let returned = {
            let mut in_flight = self.in_flight.lock().unwrap();
            let index = in_flight.iter().position(|d| d.receipt == receipt);
            index.map(|index| in_flight.remove(index))
        };
        if let Some(delivery) = returned {
            self.pending.lock().unwrap().push_back(delivery.envelope);
        }
        Ok(())
    }
}
