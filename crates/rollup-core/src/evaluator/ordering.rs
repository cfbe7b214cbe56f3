//! Order-by chain comparison

use std::cmp::Ordering;

use crate::model::{FieldValue, NullOrdering, OrderBy, SortDirection};

use super::GroupItem;

/// Compare two items' sort keys criterion by criterion
///
/// Null placement follows each criterion's null ordering regardless of its
/// direction. Blank text counts as null.
pub fn compare_keys(order_bys: &[OrderBy], a: &[FieldValue], b: &[FieldValue]) -> Ordering {
    for (i, order_by) in order_bys.iter().enumerate() {
        let x = a.get(i).unwrap_or(&FieldValue::Null);
        let y = b.get(i).unwrap_or(&FieldValue::Null);
        let nulls_first = order_by.nulls == NullOrdering::First;
        let ord = match (x.is_blank(), y.is_blank()) {
            (true, true) => Ordering::Equal,
            (true, false) if nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match order_by.direction {
                SortDirection::Ascending => x.total_cmp(y),
                SortDirection::Descending => y.total_cmp(x),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable sort; remaining ties keep fetch order
pub fn sort_items(order_bys: &[OrderBy], items: &mut [GroupItem]) {
    if order_bys.is_empty() {
        return;
    }
    items.sort_by(|a, b| compare_keys(order_bys, &a.sort_keys, &b.sort_keys));
}
