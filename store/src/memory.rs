//! In-memory host runtime for tests.
//!
//! Models the pieces of the host the service observes: a key-ordered state
//! map, per-transaction id/time, bookmark pagination, a rich-query subset
//! (equality, `$gt`/`$lte` style bounds, `$exists`, single-direction sort),
//! and a pluggable invoke handler standing in for peer services.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;
use tessera_types::TxTime;

use crate::host::{Host, KvPage, KvPair, SortSpec};
use crate::StoreError;

const DEFAULT_PAGE: u32 = 1000;

type InvokeHandler = Box<dyn Fn(&str, &[&str]) -> Result<Vec<u8>, StoreError>>;

pub struct MemHost {
    state: RefCell<BTreeMap<String, Vec<u8>>>,
    tx_id: RefCell<String>,
    tx_time: Cell<TxTime>,
    caller: RefCell<Option<String>>,
    invoke_handler: RefCell<Option<InvokeHandler>>,
}

impl Default for MemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemHost {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(BTreeMap::new()),
            tx_id: RefCell::new("tx-0".to_owned()),
            tx_time: Cell::new(TxTime::EPOCH),
            caller: RefCell::new(None),
            invoke_handler: RefCell::new(None),
        }
    }

    /// Start a simulated transaction: subsequent calls observe this id and
    /// timestamp until the next `begin_tx`.
    pub fn begin_tx(&self, id: &str, time: TxTime) {
        *self.tx_id.borrow_mut() = id.to_owned();
        self.tx_time.set(time);
        *self.caller.borrow_mut() = None;
    }

    /// Mark the current transaction as invoked by another service.
    pub fn set_caller_service(&self, service: Option<&str>) {
        *self.caller.borrow_mut() = service.map(str::to_owned);
    }

    /// Install the handler backing [`Host::invoke`].
    pub fn set_invoke_handler(
        &self,
        handler: impl Fn(&str, &[&str]) -> Result<Vec<u8>, StoreError> + 'static,
    ) {
        *self.invoke_handler.borrow_mut() = Some(Box::new(handler));
    }

    pub fn key_count(&self) -> usize {
        self.state.borrow().len()
    }

    /// All keys currently in state; handy for invariant assertions.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.state
            .borrow()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Compare two JSON leaf values; numbers numerically, everything else by
/// canonical text.
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Evaluate one field condition of a selector.
fn matches_condition(doc_value: Option<&Value>, cond: &Value) -> bool {
    if let Some(ops) = cond.as_object() {
        if ops.keys().any(|k| k.starts_with('$')) {
            for (op, rhs) in ops {
                let ok = match op.as_str() {
                    "$exists" => doc_value.is_some() == rhs.as_bool().unwrap_or(true),
                    "$eq" => doc_value.is_some_and(|v| cmp_values(v, rhs) == Ordering::Equal),
                    "$gt" => doc_value.is_some_and(|v| cmp_values(v, rhs) == Ordering::Greater),
                    "$gte" => doc_value.is_some_and(|v| cmp_values(v, rhs) != Ordering::Less),
                    "$lt" => doc_value.is_some_and(|v| cmp_values(v, rhs) == Ordering::Less),
                    "$lte" => doc_value.is_some_and(|v| cmp_values(v, rhs) != Ordering::Greater),
                    _ => false,
                };
                if !ok {
                    return false;
                }
            }
            return true;
        }
    }
    doc_value.is_some_and(|v| cmp_values(v, cond) == Ordering::Equal)
}

fn matches_selector(doc: &Value, selector: &Value) -> bool {
    let Some(fields) = selector.as_object() else {
        return false;
    };
    fields
        .iter()
        .all(|(field, cond)| matches_condition(doc.get(field), cond))
}

impl Host for MemHost {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.borrow().get(key).cloned())
    }

    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.state
            .borrow_mut()
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete_state(&self, key: &str) -> Result<(), StoreError> {
        self.state.borrow_mut().remove(key);
        Ok(())
    }

    fn get_state_range(
        &self,
        start: &str,
        end: &str,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, StoreError> {
        let limit = if page_size == 0 {
            DEFAULT_PAGE
        } else {
            page_size
        } as usize;
        let effective_start = match bookmark {
            Some(b) if b > start => b.to_owned(),
            _ => start.to_owned(),
        };

        let state = self.state.borrow();
        let mut entries = Vec::new();
        let mut next = None;
        for (k, v) in state.range(effective_start..end.to_owned()) {
            if entries.len() == limit {
                next = Some(k.clone());
                break;
            }
            entries.push(KvPair {
                key: k.clone(),
                value: v.clone(),
            });
        }
        Ok(KvPage {
            entries,
            bookmark: next,
        })
    }

    fn query(
        &self,
        selector: &Value,
        sort: &[SortSpec],
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, StoreError> {
        let limit = if page_size == 0 {
            DEFAULT_PAGE
        } else {
            page_size
        } as usize;
        let offset: usize = bookmark
            .and_then(|b| b.parse().ok())
            .unwrap_or(0);

        let state = self.state.borrow();
        let mut hits: Vec<(String, Value, Vec<u8>)> = Vec::new();
        for (k, raw) in state.iter() {
            let Ok(doc) = serde_json::from_slice::<Value>(raw) else {
                continue;
            };
            if matches_selector(&doc, selector) {
                hits.push((k.clone(), doc, raw.clone()));
            }
        }

        hits.sort_by(|(ka, da, _), (kb, db, _)| {
            for spec in sort {
                let missing = Value::Null;
                let va = da.get(&spec.field).unwrap_or(&missing);
                let vb = db.get(&spec.field).unwrap_or(&missing);
                let ord = cmp_values(va, vb);
                let ord = if spec.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            ka.cmp(kb)
        });

        let page: Vec<KvPair> = hits
            .into_iter()
            .skip(offset)
            .take(limit + 1)
            .map(|(key, _, value)| KvPair { key, value })
            .collect();
        let (entries, next) = if page.len() > limit {
            (
                page[..limit].to_vec(),
                Some((offset + limit).to_string()),
            )
        } else {
            (page, None)
        };
        Ok(KvPage {
            entries,
            bookmark: next,
        })
    }

    fn tx_id(&self) -> String {
        self.tx_id.borrow().clone()
    }

    fn tx_time(&self) -> TxTime {
        self.tx_time.get()
    }

    fn invoke(&self, service: &str, args: &[&str]) -> Result<Vec<u8>, StoreError> {
        match &*self.invoke_handler.borrow() {
            Some(handler) => handler(service, args),
            None => Err(StoreError::Invoke {
                service: service.to_owned(),
                message: "no invoke handler installed".to_owned(),
            }),
        }
    }

    fn caller_service(&self) -> Option<String> {
        self.caller.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateGateway;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Note {
        #[serde(rename = "@note")]
        id: String,
        created: i64,
    }

    fn seeded() -> MemHost {
        let host = MemHost::new();
        for i in 0..5 {
            let doc = Note {
                id: format!("n{i}"),
                created: 100 - i,
            };
            host.put_state(
                &format!("NOTE_{i}"),
                &serde_json::to_vec(&doc).unwrap(),
            )
            .unwrap();
        }
        host
    }

    #[test]
    fn gateway_roundtrip_and_insert_guard() {
        let host = MemHost::new();
        let gw = StateGateway::new(&host);
        let doc = Note {
            id: "a".into(),
            created: 1,
        };
        gw.insert("NOTE_a", &doc).unwrap();
        assert!(matches!(
            gw.insert("NOTE_a", &doc),
            Err(StoreError::AlreadyExists(_))
        ));
        let back: Note = gw.get_existing("NOTE_a").unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn range_paginates_with_bookmark() {
        let host = seeded();
        let first = host.get_state_range("NOTE_", "NOTE`", 2, None).unwrap();
        assert_eq!(first.entries.len(), 2);
        let bm = first.bookmark.clone().unwrap();
        let second = host
            .get_state_range("NOTE_", "NOTE`", 2, Some(&bm))
            .unwrap();
        assert_eq!(second.entries[0].key, "NOTE_2");
        let third = host
            .get_state_range("NOTE_", "NOTE`", 2, second.bookmark.as_deref())
            .unwrap();
        assert_eq!(third.entries.len(), 1);
        assert!(third.bookmark.is_none());
    }

    #[test]
    fn query_filters_and_sorts() {
        let host = seeded();
        let page = host
            .query(
                &json!({"@note": {"$exists": true}, "created": {"$gt": 96}}),
                &[SortSpec::asc("created")],
                10,
                None,
            )
            .unwrap();
        let ids: Vec<String> = page
            .entries
            .iter()
            .map(|e| {
                serde_json::from_slice::<Note>(&e.value).unwrap().id
            })
            .collect();
        assert_eq!(ids, ["n3", "n2", "n1", "n0"]);
    }

    #[test]
    fn query_offset_bookmark() {
        let host = seeded();
        let selector = json!({"@note": {"$exists": true}});
        let sort = [SortSpec::desc("created")];
        let first = host.query(&selector, &sort, 3, None).unwrap();
        assert_eq!(first.entries.len(), 3);
        let second = host
            .query(&selector, &sort, 3, first.bookmark.as_deref())
            .unwrap();
        assert_eq!(second.entries.len(), 2);
        assert!(second.bookmark.is_none());
    }

    #[test]
    fn invoke_requires_handler() {
        let host = MemHost::new();
        assert!(host.invoke("ident", &["kid"]).is_err());
        host.set_invoke_handler(|service, _| Ok(service.as_bytes().to_vec()));
        assert_eq!(host.invoke("ident", &["kid"]).unwrap(), b"ident");
    }
}
