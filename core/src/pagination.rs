//! Offset/limit pagination over list endpoints.
//!
//! # Design
//! Pages are requested strictly in order. A page is full when it holds
//! exactly `limit` records, and only a full page leads to the next request,
//! at `offset + limit`. A short page, including an empty one, ends the walk.
//! A repository holding an exact multiple of `limit` records therefore costs
//! one extra request answered with `[]`.
//!
//! Any failing page aborts the whole fetch; records gathered from earlier
//! pages are dropped with it. A full page whose first record equals the
//! previous page's first record means the server ignores `offset`, and the
//! walk ends with `ApiError::Pagination` instead of looping.

use serde_json::Value;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse};
use crate::session::SessionManager;
use crate::transport::Transport;

/// `path` with `offset` and `limit` query parameters appended.
pub fn page_path(path: &str, offset: usize, limit: usize) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}offset={offset}&limit={limit}")
}

pub fn is_full_page(len: usize, limit: usize) -> bool {
    len == limit
}

/// Split one page response into raw records.
pub fn parse_page(path: &str, response: HttpResponse) -> Result<Vec<Value>, ApiError> {
    if !response.is_success() {
        return Err(ApiError::Fetch {
            path: path.to_string(),
            status: response.status,
            body: response.body,
        });
    }
    match serde_json::from_str(&response.body) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(_) => Err(ApiError::Deserialization(format!(
            "{path}: expected a JSON array of records"
        ))),
        Err(e) => Err(ApiError::Deserialization(format!("{path}: {e}"))),
    }
}

/// Fetch every page of `path` starting at `offset`, hydrating each record
/// with `hydrate` in server order.
pub fn fetch_all<T, E, F>(
    session: &SessionManager<T>,
    path: &str,
    offset: usize,
    limit: usize,
    hydrate: F,
) -> Result<Vec<E>, ApiError>
where
    T: Transport,
    F: FnMut(Value) -> Result<E, ApiError>,
{
    collect_pages(session, path, offset, limit, hydrate).inspect_err(|e| {
        error!(path, error = %e, "could not fetch");
    })
}

fn collect_pages<T, E, F>(
    session: &SessionManager<T>,
    path: &str,
    mut offset: usize,
    limit: usize,
    mut hydrate: F,
) -> Result<Vec<E>, ApiError>
where
    T: Transport,
    F: FnMut(Value) -> Result<E, ApiError>,
{
    if limit == 0 {
        return Err(ApiError::InvalidConfig(
            "page limit must be greater than zero".to_string(),
        ));
    }

    let mut results = Vec::new();
    let mut previous_head: Option<Value> = None;
    loop {
        let response =
            session.authorized_request(HttpMethod::Get, &page_path(path, offset, limit), None)?;
        let records = parse_page(path, response)?;
        let count = records.len();
        debug!(path, offset, limit, count, "fetched page");

        let head = records.first().cloned();
        if head.is_some() && head == previous_head {
            return Err(ApiError::Pagination {
                path: path.to_string(),
                offset,
                reason: "page starts with the same record as the previous one".to_string(),
            });
        }

        results.reserve(count);
        for record in records {
            results.push(hydrate(record)?);
        }

        if !is_full_page(count, limit) {
            return Ok(results);
        }
        offset = offset.checked_add(limit).ok_or_else(|| {
            ApiError::InvalidConfig(format!("offset {offset} + limit {limit} overflows"))
        })?;
        previous_head = head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::Hydrate;
    use crate::test_support::{
        login_ok, paged_repository, path_of, query_param, response, FakeTransport, BASE_URL,
    };
    use crate::types::{EntityKind, Item};

    fn manager(transport: &FakeTransport) -> SessionManager<&FakeTransport> {
        let manager = SessionManager::new(transport, BASE_URL);
        manager.login("a@b.c", "pw").unwrap();
        manager
    }

    fn offsets(transport: &FakeTransport) -> Vec<usize> {
        transport
            .requests_to(HttpMethod::Get, "/items")
            .iter()
            .map(|r| query_param(r, "offset").unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn page_path_appends_query() {
        assert_eq!(page_path("/items", 0, 100), "/items?offset=0&limit=100");
        assert_eq!(
            page_path("/items?expand=metadata", 5, 5),
            "/items?expand=metadata&offset=5&limit=5"
        );
    }

    #[test]
    fn pages_of_two_two_one_are_concatenated() {
        let transport = paged_repository(5);
        let session = manager(&transport);
        let items = fetch_all(&session, "/items", 0, 2, Item::hydrate).unwrap();

        assert_eq!(items.len(), 5);
        let names: Vec<_> = items.iter().map(|i| i.info.uuid.as_str()).collect();
        assert_eq!(names, ["item-0", "item-1", "item-2", "item-3", "item-4"]);
        assert_eq!(offsets(&transport), [0, 2, 4]);
    }

    #[test]
    fn single_short_page_is_one_request() {
        let transport = paged_repository(1);
        let session = manager(&transport);
        let items = fetch_all(&session, "/items", 0, 2, Item::hydrate).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(offsets(&transport), [0]);
    }

    #[test]
    fn exact_multiple_of_limit_fetches_everything() {
        // Four full pages of five: continuation depends only on page fullness,
        // never on how the running offset compares with the limit.
        let transport = paged_repository(20);
        let session = manager(&transport);
        let items = fetch_all(&session, "/items", 0, 5, Item::hydrate).unwrap();
        assert_eq!(items.len(), 20);
        assert_eq!(offsets(&transport), [0, 5, 10, 15, 20]);
    }

    #[test]
    fn starting_offset_is_honoured() {
        let transport = paged_repository(7);
        let session = manager(&transport);
        let items = fetch_all(&session, "/items", 3, 3, Item::hydrate).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].info.uuid, "item-3");
        assert_eq!(offsets(&transport), [3, 6]);
    }

    #[test]
    fn failing_page_discards_earlier_results() {
        let transport = FakeTransport::new(|req| {
            if path_of(req) == "/login" {
                return Ok(login_ok());
            }
            match query_param(req, "offset").as_deref() {
                Some("0") => Ok(response(200, &crate::test_support::item_page(0, 2))),
                _ => Ok(response(503, "maintenance")),
            }
        });
        let session = manager(&transport);
        let err = fetch_all(&session, "/items", 0, 2, Item::hydrate).unwrap_err();
        match err {
            ApiError::Fetch { path, status, body } => {
                assert_eq!(path, "/items");
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_record_aborts_fetch() {
        let transport = FakeTransport::new(|req| {
            if path_of(req) == "/login" {
                return Ok(login_ok());
            }
            Ok(response(200, r#"[{"uuid":"x","archived":"true","withdrawn":"false"}]"#))
        });
        let session = manager(&transport);
        let err = fetch_all(&session, "/items", 0, 10, Item::hydrate).unwrap_err();
        assert!(matches!(err, ApiError::Hydration { kind: EntityKind::Item, .. }));
    }

    #[test]
    fn non_array_body_is_rejected() {
        let transport = FakeTransport::new(|req| {
            if path_of(req) == "/login" {
                return Ok(login_ok());
            }
            Ok(response(200, r#"{"error":"nope"}"#))
        });
        let session = manager(&transport);
        let err = fetch_all(&session, "/items", 0, 10, Ok).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn zero_limit_is_rejected_without_requests() {
        let transport = paged_repository(3);
        let session = manager(&transport);
        let err = fetch_all(&session, "/items", 0, 0, Ok).unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
        assert!(offsets(&transport).is_empty());
    }

    #[test]
    fn server_ignoring_offset_is_detected() {
        let transport = FakeTransport::new(|req| {
            if path_of(req) == "/login" {
                return Ok(login_ok());
            }
            Ok(response(200, &crate::test_support::item_page(0, 2)))
        });
        let session = manager(&transport);
        let err = fetch_all(&session, "/items", 0, 2, Item::hydrate).unwrap_err();
        match err {
            ApiError::Pagination { path, offset, .. } => {
                assert_eq!(path, "/items");
                assert_eq!(offset, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(offsets(&transport), [0, 2]);
    }

    #[test]
    fn offset_overflow_is_rejected() {
        let transport = FakeTransport::new(|req| {
            if path_of(req) == "/login" {
                return Ok(login_ok());
            }
            Ok(response(200, &crate::test_support::item_page(0, 2)))
        });
        let session = manager(&transport);
        let err = fetch_all(&session, "/items", usize::MAX - 1, 2, Item::hydrate).unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
        assert_eq!(offsets(&transport), [usize::MAX - 1]);
    }
}
