//! Order book listing.

use crate::error::RepositoryError;
use crate::repository::OrderRepository;
use crate::types::OrderView;

/// Every order ever created, in insertion order, taken from one consistent snapshot.
pub fn list_orders(
    repo: &dyn OrderRepository,
) -> Result<impl Iterator<Item = OrderView>, RepositoryError> {
    Ok(repo.snapshot()?.into_iter().map(OrderView::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::matching::match_order;
    use crate::repository::MemoryOrderRepository;
    use crate::types::{NewOrder, OrderId, Platform};
    use chrono::Utc;

    fn new_order(buy: &str, sell: &str, buy_amount: i64, sell_amount: i64) -> NewOrder {
        NewOrder {
            sender_pk: format!("{}-seller", sell),
            receiver_pk: format!("{}-buyer", buy),
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
    fn empty_book_lists_nothing() {
        let repo = MemoryOrderRepository::new();
        assert_eq!(list_orders(&repo).unwrap().count(), 0);
    }

    #[test]
    fn lists_resting_filled_and_child_orders_in_insertion_order() {
        let repo = MemoryOrderRepository::new();
        let mut tx = repo.begin().unwrap();
        let e = tx.insert(new_order("B", "A", 50, 100)).unwrap();
        let n = tx.insert(new_order("A", "B", 40, 40)).unwrap();
        let lone = tx.insert(new_order("C", "D", 1, 1)).unwrap();
        match_order(tx.as_mut(), n, Utc::now()).unwrap();
        tx.commit().unwrap();

        let views: Vec<OrderView> = list_orders(&repo).unwrap().collect();
        let ids: Vec<OrderId> = views.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![e, n, lone, OrderId(4)]);
        assert_eq!(views[0].counterparty_id, Some(n));
        assert!(views[1].filled_at.is_some());
        assert!(views[2].filled_at.is_none());
        assert_eq!(views[3].creator_id, Some(e));
        assert_eq!(views[0].signature.as_deref(), Some("sig"));
        assert_eq!(views[3].signature, None);
    }

    #[test]
    fn view_serializes_amounts_as_strings() {
        let repo = MemoryOrderRepository::new();
        let mut tx = repo.begin().unwrap();
        tx.insert(new_order("A", "B", 3, 7)).unwrap();
        tx.commit().unwrap();
        let view = list_orders(&repo).unwrap().next().unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["buy_amount"], "3");
        assert_eq!(json["sell_amount"], "7");
        assert_eq!(json["filled_at"], serde_json::Value::Null);
    }
}
