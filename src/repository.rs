//! Order store interface and the in-process implementation.
//!
//! All reads and writes happen inside an [`OrderTransaction`]. A transaction obtained from
//! [`MemoryOrderRepository`] holds the store lock until it is committed or dropped, so every
//! transaction is serializable. Dropping a transaction without committing rolls it back.

use crate::error::RepositoryError;
use crate::persistence::{FilePersistence, PersistedState};
use crate::types::{NewOrder, Order, OrderId};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// Result of a compare-and-swap fill update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillUpdate {
    Applied,
    /// The order was already filled; nothing was written.
    Conflict,
}

/// Unit of work against the order store.
pub trait OrderTransaction {
    fn get(&self, id: OrderId) -> Result<Order, RepositoryError>;

    /// Inserts an unfilled order and returns its newly assigned id.
    fn insert(&mut self, order: NewOrder) -> Result<OrderId, RepositoryError>;

    /// Unfilled orders buying `buy_currency` with `sell_currency`, in insertion order.
    fn query_unfilled_by_pair(
        &self,
        buy_currency: &str,
        sell_currency: &str,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Marks `id` filled against `counterparty` if and only if it is still unfilled.
    fn update_fill_atomic(
        &mut self,
        id: OrderId,
        counterparty: OrderId,
        filled_at: DateTime<Utc>,
    ) -> Result<FillUpdate, RepositoryError>;

    fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Durable order store.
pub trait OrderRepository: Send + Sync {
    fn begin(&self) -> Result<Box<dyn OrderTransaction + '_>, RepositoryError>;

    /// Consistent copy of every order, in insertion order.
    fn snapshot(&self) -> Result<Vec<Order>, RepositoryError>;
}

fn empty_state() -> PersistedState {
    PersistedState {
        orders: Vec::new(),
        next_id: 1,
    }
}

/// Ids are dense and start at 1, so an order's id is its position plus one.
fn position(state: &PersistedState, id: OrderId) -> Option<usize> {
    let index = usize::try_from(id.0.checked_sub(1)?).ok()?;
    match state.orders.get(index) {
        Some(order) if order.id == id => Some(index),
        _ => None,
    }
}

/// In-process order store, optionally backed by a snapshot file written on every commit.
#[derive(Debug)]
pub struct MemoryOrderRepository {
    state: Mutex<PersistedState>,
    persistence: Option<FilePersistence>,
}

impl MemoryOrderRepository {
    /// Volatile store; nothing survives the process.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(empty_state()),
            persistence: None,
        }
    }

    /// Store backed by `persistence`, restoring any previous snapshot.
    pub fn open(persistence: FilePersistence) -> Result<Self, RepositoryError> {
        let state = persistence.load()?.unwrap_or_else(empty_state);
        for (i, order) in state.orders.iter().enumerate() {
            if order.id.0 != i as u64 + 1 {
                return Err(RepositoryError::Corrupt(format!(
                    "order at position {} has id {}",
                    i, order.id
                )));
            }
            if !order.buy_amount.is_positive() || !order.sell_amount.is_positive() {
                return Err(RepositoryError::Corrupt(format!(
                    "order {} has a non-positive amount",
                    order.id
                )));
            }
        }
        if state.next_id != state.orders.len() as u64 + 1 {
            return Err(RepositoryError::Corrupt(format!(
                "next_id {} does not follow {} orders",
                state.next_id,
                state.orders.len()
            )));
        }
        log::info!(
            "order store opened path={} orders={}",
            persistence.path().display(),
            state.orders.len()
        );
        Ok(Self {
            state: Mutex::new(state),
            persistence: Some(persistence),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, PersistedState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("order store lock poisoned".into()))
    }
}

impl Default for MemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderRepository for MemoryOrderRepository {
    fn begin(&self) -> Result<Box<dyn OrderTransaction + '_>, RepositoryError> {
        Ok(Box::new(MemoryTransaction {
            state: self.lock()?,
            persistence: self.persistence.as_ref(),
            undo: Vec::new(),
            finished: false,
        }))
    }

    fn snapshot(&self) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.lock()?.orders.clone())
    }
}

enum Undo {
    Insert,
    Fill(OrderId),
}

struct MemoryTransaction<'a> {
    state: MutexGuard<'a, PersistedState>,
    persistence: Option<&'a FilePersistence>,
    undo: Vec<Undo>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn rollback(&mut self) {
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Insert => {
                    self.state.orders.pop();
                    self.state.next_id -= 1;
                }
                Undo::Fill(id) => {
                    if let Some(i) = position(&self.state, id) {
                        let order = &mut self.state.orders[i];
                        order.filled_at = None;
                        order.counterparty_id = None;
                    }
                }
            }
        }
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

impl OrderTransaction for MemoryTransaction<'_> {
    fn get(&self, id: OrderId) -> Result<Order, RepositoryError> {
        position(&self.state, id)
            .map(|i| self.state.orders[i].clone())
            .ok_or(RepositoryError::NotFound(id))
    }

    fn insert(&mut self, order: NewOrder) -> Result<OrderId, RepositoryError> {
        let id = OrderId(self.state.next_id);
        self.state.orders.push(Order::from_new(id, order));
        self.state.next_id += 1;
        self.undo.push(Undo::Insert);
        Ok(id)
    }

    fn query_unfilled_by_pair(
        &self,
        buy_currency: &str,
        sell_currency: &str,
    ) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .state
            .orders
            .iter()
            .filter(|o| {
                !o.is_filled() && o.buy_currency == buy_currency && o.sell_currency == sell_currency
            })
            .cloned()
            .collect())
    }

    fn update_fill_atomic(
        &mut self,
        id: OrderId,
        counterparty: OrderId,
        filled_at: DateTime<Utc>,
    ) -> Result<FillUpdate, RepositoryError> {
        let i = position(&self.state, id).ok_or(RepositoryError::NotFound(id))?;
        let order = &mut self.state.orders[i];
        if order.is_filled() {
            return Ok(FillUpdate::Conflict);
        }
        order.filled_at = Some(filled_at);
        order.counterparty_id = Some(counterparty);
        self.undo.push(Undo::Fill(id));
        Ok(FillUpdate::Applied)
    }

    fn commit(mut self: Box<Self>) -> Result<(), RepositoryError> {
        if !self.undo.is_empty() {
            if let Some(persistence) = self.persistence {
                if let Err(e) = persistence.save(&self.state) {
                    log::error!("snapshot write failed, rolling back: {}", e);
                    self.rollback();
                    self.finished = true;
                    return Err(e.into());
                }
            }
        }
        self.undo.clear();
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::types::Platform;

    fn new_order(buy: &str, sell: &str, buy_amount: i64, sell_amount: i64) -> NewOrder {
        NewOrder {
            sender_pk: "sender".into(),
            receiver_pk: "receiver".into(),
            buy_currency: buy.into(),
            sell_currency: sell.into(),
            buy_amount: Amount::from(buy_amount),
            sell_amount: Amount::from(sell_amount),
            signature: Some("sig".into()),
            platform: Some(Platform::Ethereum),
            creator_id: None,
        }
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let repo = MemoryOrderRepository::new();
        let mut tx = repo.begin().unwrap();
        let a = tx.insert(new_order("A", "B", 1, 1)).unwrap();
        let b = tx.insert(new_order("B", "A", 1, 1)).unwrap();
        tx.commit().unwrap();
        assert_eq!((a, b), (OrderId(1), OrderId(2)));
        let orders = repo.snapshot().unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.filled_at.is_none() && o.counterparty_id.is_none()));
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let repo = MemoryOrderRepository::new();
        let mut tx = repo.begin().unwrap();
        let id = tx.insert(new_order("A", "B", 1, 1)).unwrap();
        tx.commit().unwrap();

        {
            let mut tx = repo.begin().unwrap();
            tx.insert(new_order("B", "A", 1, 1)).unwrap();
            assert_eq!(
                tx.update_fill_atomic(id, OrderId(2), Utc::now()).unwrap(),
                FillUpdate::Applied
            );
        }

        let orders = repo.snapshot().unwrap();
        assert_eq!(orders.len(), 1);
        assert!(orders[0].filled_at.is_none());
        let mut tx = repo.begin().unwrap();
        assert_eq!(tx.insert(new_order("B", "A", 1, 1)).unwrap(), OrderId(2));
    }

    #[test]
    fn query_unfilled_by_pair_filters_pair_and_fill_state() {
        let repo = MemoryOrderRepository::new();
        let mut tx = repo.begin().unwrap();
        let a = tx.insert(new_order("A", "B", 1, 1)).unwrap();
        tx.insert(new_order("B", "A", 1, 1)).unwrap();
        let c = tx.insert(new_order("A", "B", 2, 2)).unwrap();
        tx.insert(new_order("A", "C", 1, 1)).unwrap();
        tx.update_fill_atomic(a, OrderId(2), Utc::now()).unwrap();
        let found = tx.query_unfilled_by_pair("A", "B").unwrap();
        assert_eq!(found.iter().map(|o| o.id).collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn fill_update_is_compare_and_swap() {
        let repo = MemoryOrderRepository::new();
        let mut tx = repo.begin().unwrap();
        let a = tx.insert(new_order("A", "B", 1, 1)).unwrap();
        assert_eq!(tx.update_fill_atomic(a, OrderId(7), Utc::now()).unwrap(), FillUpdate::Applied);
        assert_eq!(tx.update_fill_atomic(a, OrderId(8), Utc::now()).unwrap(), FillUpdate::Conflict);
        assert_eq!(tx.get(a).unwrap().counterparty_id, Some(OrderId(7)));
        assert_eq!(
            tx.update_fill_atomic(OrderId(99), a, Utc::now()),
            Err(RepositoryError::NotFound(OrderId(99)))
        );
    }

    #[test]
    fn committed_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        {
            let repo = MemoryOrderRepository::open(FilePersistence::new(&path)).unwrap();
            let mut tx = repo.begin().unwrap();
            tx.insert(new_order("A", "B", 5, 10)).unwrap();
            tx.commit().unwrap();
            let mut tx = repo.begin().unwrap();
            tx.insert(new_order("B", "A", 1, 1)).unwrap();
            drop(tx);
        }
        let repo = MemoryOrderRepository::open(FilePersistence::new(&path)).unwrap();
        let orders = repo.snapshot().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].sell_amount, Amount::from(10));
        let mut tx = repo.begin().unwrap();
        assert_eq!(tx.insert(new_order("B", "A", 1, 1)).unwrap(), OrderId(2));
    }

    #[test]
    fn failed_snapshot_write_rolls_back_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        let repo = MemoryOrderRepository::open(FilePersistence::new(&path)).unwrap();
        // A directory in the way makes the rename fail.
        std::fs::create_dir(&path).unwrap();
        let mut tx = repo.begin().unwrap();
        tx.insert(new_order("A", "B", 1, 1)).unwrap();
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)));
        assert!(repo.snapshot().unwrap().is_empty());
    }

    #[test]
    fn open_rejects_non_dense_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        let persistence = FilePersistence::new(&path);
        let state = PersistedState {
            orders: vec![Order::from_new(OrderId(2), new_order("A", "B", 1, 1))],
            next_id: 3,
        };
        persistence.save(&state).unwrap();
        let err = MemoryOrderRepository::open(persistence).unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt(_)));
    }

    #[test]
    fn open_rejects_zero_amounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        let persistence = FilePersistence::new(&path);
        let mut order = Order::from_new(OrderId(1), new_order("A", "B", 1, 1));
        order.buy_amount = Amount::zero();
        let state = PersistedState {
            orders: vec![order],
            next_id: 2,
        };
        persistence.save(&state).unwrap();
        let err = MemoryOrderRepository::open(persistence).unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt(_)));
    }
}
