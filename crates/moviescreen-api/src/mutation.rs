//! # Version-Checked Mutation
//!
//! Read-modify-write on versioned records without holding locks between
//! the read and the write. The write is conditional on the version that was
//! read; if another writer got there first the store reports
//! [`StoreError::EditConflict`] and nothing is changed.
//!
//! Callers may additionally pin the version they observed earlier (the
//! `X-Expected-Version` header); a mismatch is rejected before any write.

use moviescreen_core::{StoreError, Version, Versioned};

use crate::store::VersionedStore;

/// Fetch `id`, apply `patch`, and write it back conditionally.
///
/// Returns the entity as written, carrying its new version.
pub async fn mutate<T, S>(
    store: &S,
    id: T::Id,
    observed: Option<Version>,
    patch: impl FnOnce(&mut T),
) -> Result<T, StoreError>
where
    T: Versioned + 'static,
    S: VersionedStore<T> + ?Sized,
{
    let mut entity = store.fetch(id).await?;

    if let Some(observed) = observed {
        if observed != entity.version() {
            tracing::debug!(?id, %observed, current = %entity.version(), "stale expected version");
            return Err(StoreError::EditConflict);
        }
    }

    patch(&mut entity);
    commit(store, &mut entity).await?;
    Ok(entity)
}

/// Conditionally write an already-fetched entity, updating its version in
/// place on success.
pub async fn commit<T, S>(store: &S, entity: &mut T) -> Result<(), StoreError>
where
    T: Versioned + 'static,
    S: VersionedStore<T> + ?Sized,
{
    let version = store.update(entity).await?;
    entity.set_version(version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::MovieStore;
    use moviescreen_core::{Movie, MovieDraft, Runtime};

    async fn seeded() -> (MemoryStore, Movie) {
        let store = MemoryStore::new();
        let movie = store
            .create(MovieDraft {
                title: "Heat".into(),
                year: 1995,
                runtime: Runtime(170),
                genres: vec!["crime".into()],
            })
            .await
            .unwrap();
        (store, movie)
    }

    #[tokio::test]
    async fn mutate_applies_patch_and_bumps_version() {
        let (store, movie) = seeded().await;
        let updated = mutate::<Movie, _>(&store, movie.id, None, |m| m.runtime = Runtime(171))
            .await
            .unwrap();
        assert_eq!(updated.version, Version(2));
        assert_eq!(updated.runtime, Runtime(171));
    }

    #[tokio::test]
    async fn mismatched_observed_version_is_rejected_without_write() {
        let (store, movie) = seeded().await;
        let result =
            mutate::<Movie, _>(&store, movie.id, Some(Version(7)), |m| m.year = 1996).await;
        assert!(matches!(result, Err(StoreError::EditConflict)));

        let current = VersionedStore::<Movie>::fetch(&store, movie.id).await.unwrap();
        assert_eq!(current.version, Version::INITIAL);
        assert_eq!(current.year, 1995);
    }

    #[tokio::test]
    async fn concurrent_commits_from_same_read_conflict() {
        let (store, movie) = seeded().await;
        let mut a = movie.clone();
        let mut b = movie.clone();
        a.year = 1996;
        b.year = 1997;

        commit(&store, &mut a).await.unwrap();
        assert_eq!(a.version, Version(2));
        assert!(matches!(
            commit(&store, &mut b).await,
            Err(StoreError::EditConflict)
        ));
        assert_eq!(b.version, Version::INITIAL);

        let current = VersionedStore::<Movie>::fetch(&store, movie.id).await.unwrap();
        assert_eq!(current.version, Version(2));
        assert_eq!(current.year, 1996);
    }

    #[tokio::test]
    async fn mutate_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let result =
            mutate::<Movie, _>(&store, moviescreen_core::MovieId(404), None, |_| {}).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn racing_tasks_produce_exactly_one_winner() {
        let (store, movie) = seeded().await;
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for year in 1996..2004 {
            let store = store.clone();
            let mut copy = movie.clone();
            handles.push(tokio::spawn(async move {
                copy.year = year;
                commit(store.as_ref(), &mut copy).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
