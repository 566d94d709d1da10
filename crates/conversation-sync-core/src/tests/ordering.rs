//! Ordering and deduplication of the merged view.
//!
//! Covered:
//! - tail then page, page overlapping tail, tail overlapping history
//! - tail pushes arriving while a page is in flight
//! - out-of-order tail and page deliveries
//! - randomized interleavings of appends, tail pushes, and page results

use super::{assert_ordered_unique, at, ids, numbered, numbered_range, thread};
use crate::types::{Message, MessageId};
use crate::view::ConversationView;

fn view() -> ConversationView {
    ConversationView::new(thread())
}

/// Newest `k` of `all`, ascending.
fn window(all: &[Message], k: usize) -> Vec<Message> {
    all[all.len().saturating_sub(k)..].to_vec()
}

/// Up to `l` of `all` strictly older than `cursor`, ascending.
fn page(all: &[Message], cursor: chrono::DateTime<chrono::Utc>, l: usize) -> Vec<Message> {
    let older: Vec<Message> = all.iter().filter(|m| m.timestamp < cursor).cloned().collect();
    older[older.len().saturating_sub(l)..].to_vec()
}

#[test]
fn tail_then_page_merges_in_order() {
    let mut view = view();
    view.apply_tail(vec![numbered(3), numbered(4)]);

    let request = view.begin_load_older(2).unwrap();
    assert_eq!(request.cursor, at(3));
    let inserted = view
        .complete_load_older(Ok(vec![numbered(1), numbered(2)]))
        .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(ids(view.messages()), vec!["m001", "m002", "m003", "m004"]);
    assert_eq!(view.oldest_cursor(), Some(at(1)));
}

#[test]
fn new_tail_keeps_paged_history() {
    let mut view = view();
    view.apply_tail(numbered_range(3..5));
    view.begin_load_older(2).unwrap();
    view.complete_load_older(Ok(numbered_range(1..3))).unwrap();

    // Another message arrives; the window slides forward.
    view.apply_tail(numbered_range(4..6));

    assert_eq!(
        ids(view.messages()),
        vec!["m001", "m002", "m003", "m004", "m005"]
    );
    assert_eq!(view.oldest_cursor(), Some(at(1)));
}

#[test]
fn tail_arriving_during_page_load() {
    let mut view = view();
    view.apply_tail(numbered_range(10..13));
    let request = view.begin_load_older(3).unwrap();

    view.apply_tail(numbered_range(11..14));
    assert!(view.is_loading_older());

    view.complete_load_older(Ok(numbered_range(7..10))).unwrap();
    assert_eq!(
        ids(view.messages()),
        vec!["m007", "m008", "m009", "m010", "m011", "m012", "m013"]
    );
    assert_eq!(request.cursor, at(10));
}

#[test]
fn stale_tail_after_page_keeps_everything_older() {
    let mut view = view();
    view.apply_tail(numbered_range(5..8));
    view.begin_load_older(5).unwrap();
    view.complete_load_older(Ok(numbered_range(0..5))).unwrap();

    // A delayed push of the same window changes nothing.
    assert!(!view.apply_tail(numbered_range(5..8)));
    assert_eq!(view.len(), 8);
    assert_ordered_unique(view.messages());
}

#[test]
fn page_with_timestamps_inside_the_view_is_sorted_in() {
    let mut view = view();
    view.apply_tail(vec![numbered(10), numbered(20)]);
    view.begin_load_older(5).unwrap();

    // A misbehaving store returns one message newer than the cursor.
    let mut late = numbered(15);
    late.id = MessageId::from("late");
    view.complete_load_older(Ok(vec![numbered(5), late])).unwrap();

    assert_eq!(ids(view.messages()), vec!["m005", "m010", "late", "m020"]);
}

#[test]
fn tail_out_of_order_is_sorted() {
    let mut view = view();
    view.apply_tail(vec![numbered(3), numbered(1), numbered(2)]);
    assert_eq!(ids(view.messages()), vec!["m001", "m002", "m003"]);
    assert_eq!(view.oldest_cursor(), Some(at(1)));
}

#[test]
fn equal_timestamps_order_by_id() {
    let mut first = numbered(1);
    first.id = MessageId::from("b-first");
    let mut second = numbered(1);
    second.id = MessageId::from("a-second");

    let mut view = view();
    view.apply_tail(vec![first, second]);
    assert_eq!(ids(view.messages()), vec!["a-second", "b-first"]);
}

#[test]
fn tie_order_does_not_depend_on_delivery_order() {
    let tied = |id: &str| {
        let mut message = numbered(5);
        message.id = MessageId::from(id);
        message
    };

    let mut one = view();
    let mut two = view();
    one.apply_tail(vec![tied("b"), tied("a"), numbered(6)]);
    two.apply_tail(vec![tied("a"), tied("b"), numbered(6)]);
    assert_eq!(one.messages(), two.messages());
    assert_eq!(ids(one.messages()), vec!["a", "b", "m006"]);

    // same ties arriving through an older page
    let mut three = view();
    let mut four = view();
    for side in [&mut three, &mut four] {
        side.apply_tail(vec![numbered(6)]);
        side.begin_load_older(5).unwrap();
    }
    three.complete_load_older(Ok(vec![tied("b"), tied("a")])).unwrap();
    four.complete_load_older(Ok(vec![tied("a"), tied("b")])).unwrap();
    assert_eq!(three.messages(), four.messages());
    assert_eq!(ids(three.messages()), vec!["a", "b", "m006"]);
}

/// Small deterministic generator so failures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

enum Pending {
    Tail(Vec<Message>),
    Page(Vec<Message>),
}

#[test]
fn random_interleavings_stay_ordered_and_unique() {
    for seed in 0..200u64 {
        let mut rng = Lcg(seed);
        let mut store: Vec<Message> = numbered_range(0..(rng.below(40) as i64));
        let mut next_n = store.len() as i64;
        let k = 1 + rng.below(6) as usize;
        let l = 1 + rng.below(6) as usize;

        let mut view = view();
        let mut pending: Vec<Pending> = vec![Pending::Tail(window(&store, k))];

        for _ in 0..120 {
            match rng.below(4) {
                0 => {
                    store.push(numbered(next_n));
                    next_n += 1;
                    pending.push(Pending::Tail(window(&store, k)));
                }
                1 => {
                    if let Some(request) = view.begin_load_older(l) {
                        pending.push(Pending::Page(page(&store, request.cursor, request.limit)));
                    }
                }
                _ => {
                    if !pending.is_empty() {
                        let index = rng.below(pending.len() as u64) as usize;
                        match pending.remove(index) {
                            Pending::Tail(tail) => {
                                view.apply_tail(tail);
                            }
                            Pending::Page(result) => {
                                view.complete_load_older(Ok(result)).unwrap();
                            }
                        }
                    }
                }
            }
            assert_ordered_unique(view.messages());
        }
    }
}

#[test]
fn ordered_delivery_eventually_loads_all_history() {
    let store = numbered_range(0..23);
    let mut view = view();
    view.apply_tail(window(&store, 4));

    let mut rounds = 0;
    while let Some(request) = view.begin_load_older(5) {
        view.complete_load_older(Ok(page(&store, request.cursor, request.limit)))
            .unwrap();
        rounds += 1;
        assert!(rounds < 20, "pagination did not terminate");
    }

    assert!(!view.has_more());
    assert_eq!(ids(view.messages()), ids(&store));
}
