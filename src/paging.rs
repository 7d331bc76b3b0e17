use std::future::Future;

use crate::error::RemoteApiError;

/// Page size requested from every paginated endpoint.
pub const PER_PAGE: u8 = 100;

/// Requests pages 1, 2, ... until one comes back empty and concatenates the
/// results in the order received. Each page is requested exactly once; the
/// first failure is returned and nothing collected so far survives.
pub async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, RemoteApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, RemoteApiError>>,
{
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let batch = fetch_page(page).await?;
        if batch.is_empty() {
            break;
        }
        items.extend(batch);
        page += 1;
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boom(page: u32) -> RemoteApiError {
        RemoteApiError::Status {
            url: format!("https://example.test/?page={page}"),
            status: 502,
            body: "bad gateway".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_empty_page() {
        let pages = vec![vec![1, 2, 3], vec![4, 5], vec![6]];
        let mut requested = Vec::new();

        let items = collect_pages(|page| {
            requested.push(page);
            let batch = pages.get(page as usize - 1).cloned().unwrap_or_default();
            async move { Ok(batch) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(requested, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let mut calls = 0;
        let items: Vec<u8> = collect_pages(|_| {
            calls += 1;
            async { Ok(Vec::new()) }
        })
        .await
        .unwrap();

        assert!(items.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_failure_aborts_pagination() {
        let mut requested = Vec::new();

        let result: Result<Vec<u32>, _> = collect_pages(|page| {
            requested.push(page);
            async move {
                if page == 2 {
                    Err(boom(page))
                } else {
                    Ok(vec![page])
                }
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert_eq!(requested, vec![1, 2]);
    }
}
