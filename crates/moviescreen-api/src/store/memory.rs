//! # In-Memory Stores
//!
//! A process-local implementation of every store trait, used when no
//! database is configured and throughout the test suite.
//!
//! All operations are synchronous under `parking_lot` locks that are never
//! held across `.await` points. Conditional writes run as a single
//! write-locked compare-and-set through [`Table::try_update`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moviescreen_core::filter::{Metadata, MovieQuery};
use moviescreen_core::{
    Movie, MovieDraft, MovieId, NewUser, Permissions, StoreError, Token, TokenHash, TokenScope,
    User, UserId, Version, Versioned,
};
use parking_lot::RwLock;

use super::{MovieStore, PermissionSource, TokenStore, UserStore, VersionedStore};

/// Thread-safe, cloneable keyed table.
#[derive(Debug)]
pub struct Table<K, T> {
    rows: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Table<K, T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<K: Eq + Hash + Copy, T: Clone> Table<K, T> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn get(&self, id: &K) -> Option<T> {
        self.rows.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.rows.read().values().cloned().collect()
    }

    /// Insert a row produced by `make`, which sees every existing row under
    /// the same write lock and may refuse.
    pub fn insert_with<E>(
        &self,
        make: impl FnOnce(&HashMap<K, T>) -> Result<(K, T), E>,
    ) -> Result<T, E> {
        let mut guard = self.rows.write();
        let (id, row) = make(&guard)?;
        guard.insert(id, row.clone());
        Ok(row)
    }

    /// Atomically read-validate-update a row.
    ///
    /// Returns `None` if the row doesn't exist, or the closure's result.
    pub fn try_update<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.rows.write().get_mut(id).map(f)
    }

    /// Like [`try_update`](Self::try_update), but the closure also sees the
    /// other rows (for uniqueness checks).
    pub fn try_update_with<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut T, &HashMap<K, T>) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        let mut guard = self.rows.write();
        let mut row = guard.get(id).cloned()?;
        let result = f(&mut row, &guard);
        if result.is_ok() {
            guard.insert(*id, row);
        }
        Some(result)
    }

    pub fn remove(&self, id: &K) -> Option<T> {
        self.rows.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Copy, T: Clone> Default for Table<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stored form of a token: the hash plus its metadata, never the plaintext.
#[derive(Debug, Clone)]
struct TokenRecord {
    owner: UserId,
    scope: TokenScope,
    expires_at: DateTime<Utc>,
}

/// Every store trait over shared in-process tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    movies: Table<MovieId, Movie>,
    users: Table<UserId, User>,
    tokens: RwLock<HashMap<[u8; 32], TokenRecord>>,
    permissions: RwLock<HashMap<UserId, Permissions>>,
    next_movie_id: AtomicI64,
    next_user_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of stored token records, expired ones included.
    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }
}

/// Apply a conditional write to a versioned row.
fn compare_and_set<T: Versioned>(stored: &mut T, submitted: &T) -> Result<Version, StoreError> {
    if stored.version() != submitted.version() {
        return Err(StoreError::EditConflict);
    }
    let next = submitted.version().next();
    *stored = submitted.clone();
    stored.set_version(next);
    Ok(next)
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        self.tokens.write().insert(
            *token.hash.as_bytes(),
            TokenRecord {
                owner: token.owner,
                scope: token.scope,
                expires_at: token.expires_at,
            },
        );
        Ok(())
    }

    async fn delete_all_for_owner_and_scope(
        &self,
        owner: UserId,
        scope: TokenScope,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.tokens
            .write()
            .retain(|_, t| !(t.owner == owner && t.scope == scope) && t.expires_at > now);
        Ok(())
    }
}

#[async_trait]
impl PermissionSource for MemoryStore {
    async fn all_codes_for_owner(&self, owner: UserId) -> Result<Permissions, StoreError> {
        Ok(self
            .permissions
            .read()
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_for_owner(&self, owner: UserId, codes: &[&str]) -> Result<(), StoreError> {
        let mut guard = self.permissions.write();
        let held = guard.entry(owner).or_default();
        for code in codes {
            held.insert(*code);
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedStore<Movie> for MemoryStore {
    async fn fetch(&self, id: MovieId) -> Result<Movie, StoreError> {
        self.movies.get(&id).ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &Movie) -> Result<Version, StoreError> {
        self.movies
            .try_update(&movie.id, |stored| compare_and_set(stored, movie))
            .unwrap_or(Err(StoreError::EditConflict))
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn create(&self, draft: MovieDraft) -> Result<Movie, StoreError> {
        let id = MovieId(Self::allocate(&self.next_movie_id));
        self.movies
            .insert_with(|_| Ok::<_, StoreError>((id, draft.into_movie(id, Utc::now()))))
    }

    async fn list(&self, query: &MovieQuery) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let mut matching: Vec<Movie> = self
            .movies
            .list()
            .into_iter()
            .filter(|m| query.matches(m))
            .collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok((page, Metadata::calculate(query.page, query.limit, total)))
    }

    async fn delete(&self, id: MovieId) -> Result<(), StoreError> {
        self.movies.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

fn check_unique(
    rows: &HashMap<UserId, User>,
    id: UserId,
    username: &str,
    email: &str,
) -> Result<(), StoreError> {
    let others = rows.values().filter(|u| u.id != id);
    for other in others {
        if other.email == email {
            return Err(StoreError::DuplicateEmail);
        }
        if other.username == username {
            return Err(StoreError::DuplicateUsername);
        }
    }
    Ok(())
}

#[async_trait]
impl VersionedStore<User> for MemoryStore {
    async fn fetch(&self, id: UserId) -> Result<User, StoreError> {
        self.users.get(&id).ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> Result<Version, StoreError> {
        self.users
            .try_update_with(&user.id, |stored, rows| {
                if stored.version() != user.version() {
                    return Err(StoreError::EditConflict);
                }
                check_unique(rows, user.id, &user.username, &user.email)?;
                compare_and_set(stored, user)
            })
            .unwrap_or(Err(StoreError::EditConflict))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn register(&self, user: NewUser) -> Result<User, StoreError> {
        self.users.insert_with(|rows| {
            check_unique(rows, UserId(0), &user.username, &user.email)?;
            let id = UserId(Self::allocate(&self.next_user_id));
            Ok((id, user.into_user(id, Utc::now())))
        })
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.users
            .list()
            .into_iter()
            .find(|u| u.email == email)
            .ok_or(StoreError::NotFound)
    }

    async fn get_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
    ) -> Result<User, StoreError> {
        let owner = {
            let tokens = self.tokens.read();
            let record = tokens.get(hash.as_bytes()).ok_or(StoreError::NotFound)?;
            if record.scope != scope || record.expires_at <= Utc::now() {
                return Err(StoreError::NotFound);
            }
            record.owner
        };
        self.users.get(&owner).ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moviescreen_core::permission::{MOVIES_READ, MOVIES_WRITE};
    use moviescreen_core::{PasswordHash, Runtime};

    fn draft(title: &str) -> MovieDraft {
        MovieDraft {
            title: title.into(),
            year: 1999,
            runtime: Runtime(136),
            genres: vec!["sci-fi".into()],
        }
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            password: PasswordHash::from_phc("$argon2id$stub"),
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_initial_version() {
        let store = MemoryStore::new();
        let a = store.create(draft("The Matrix")).await.unwrap();
        let b = store.create(draft("eXistenZ")).await.unwrap();
        assert_eq!(a.id, MovieId(1));
        assert_eq!(b.id, MovieId(2));
        assert_eq!(a.version, Version::INITIAL);
    }

    #[tokio::test]
    async fn stale_update_is_an_edit_conflict() {
        let store = MemoryStore::new();
        let movie = store.create(draft("The Matrix")).await.unwrap();

        let mut first = movie.clone();
        first.year = 2000;
        let mut second = movie.clone();
        second.year = 2001;

        assert_eq!(store.update(&first).await.unwrap(), Version(2));
        assert!(matches!(
            store.update(&second).await,
            Err(StoreError::EditConflict)
        ));

        let current = VersionedStore::<Movie>::fetch(&store, movie.id).await.unwrap();
        assert_eq!(current.version, Version(2));
        assert_eq!(current.year, 2000);
    }

    #[tokio::test]
    async fn update_of_deleted_record_conflicts() {
        let store = MemoryStore::new();
        let movie = store.create(draft("The Matrix")).await.unwrap();
        store.delete(movie.id).await.unwrap();
        assert!(matches!(
            store.update(&movie).await,
            Err(StoreError::EditConflict)
        ));
    }

    #[tokio::test]
    async fn double_delete_is_not_found() {
        let store = MemoryStore::new();
        let movie = store.create(draft("The Matrix")).await.unwrap();
        assert!(store.delete(movie.id).await.is_ok());
        assert!(matches!(store.delete(movie.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete(movie.id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn list_paginates_and_counts() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.create(draft(&format!("Movie {i}"))).await.unwrap();
        }
        let query = MovieQuery {
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let (movies, metadata) = store.list(&query).await.unwrap();
        let ids: Vec<i64> = movies.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(metadata.last_page, Some(3));
        assert_eq!(metadata.total_records, Some(5));
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let store = MemoryStore::new();
        store.register(new_user("alice")).await.unwrap();

        let dup_email = NewUser {
            username: "alice2".into(),
            ..new_user("alice")
        };
        assert!(matches!(
            store.register(dup_email).await,
            Err(StoreError::DuplicateEmail)
        ));

        let dup_name = NewUser {
            email: "other@example.com".into(),
            ..new_user("alice")
        };
        assert!(matches!(
            store.register(dup_name).await,
            Err(StoreError::DuplicateUsername)
        ));
    }

    #[tokio::test]
    async fn stale_user_update_conflicts_before_uniqueness() {
        let store = MemoryStore::new();
        store.register(new_user("alice")).await.unwrap();
        let bob = store.register(new_user("bob")).await.unwrap();

        let mut renamed = bob.clone();
        renamed.username = "robert".into();
        VersionedStore::<User>::update(&store, &renamed).await.unwrap();

        let mut stale = bob.clone();
        stale.email = "alice@example.com".into();
        assert!(matches!(
            VersionedStore::<User>::update(&store, &stale).await,
            Err(StoreError::EditConflict)
        ));

        let mut current = VersionedStore::<User>::fetch(&store, bob.id).await.unwrap();
        current.email = "alice@example.com".into();
        assert!(matches!(
            VersionedStore::<User>::update(&store, &current).await,
            Err(StoreError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn token_resolution_checks_scope_and_expiry() {
        let store = MemoryStore::new();
        let user = store.register(new_user("alice")).await.unwrap();

        let token = store
            .new_token(user.id, TokenScope::PasswordReset, chrono::Duration::minutes(15))
            .await
            .unwrap();
        let hash = TokenHash::of(token.plaintext());
        assert_eq!(
            store.get_for_token(TokenScope::PasswordReset, &hash).await.unwrap().id,
            user.id
        );
        assert!(matches!(
            store.get_for_token(TokenScope::Authentication, &hash).await,
            Err(StoreError::NotFound)
        ));

        let expired = Token::generate(user.id, TokenScope::Authentication, chrono::Duration::seconds(-1))
            .unwrap();
        store.insert(&expired).await.unwrap();
        assert!(matches!(
            store
                .get_for_token(TokenScope::Authentication, &expired.hash)
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn new_token_supersedes_and_purges_expired() {
        let store = MemoryStore::new();
        let user = store.register(new_user("alice")).await.unwrap();

        let stale = Token::generate(user.id, TokenScope::Activation, chrono::Duration::seconds(-5))
            .unwrap();
        store.insert(&stale).await.unwrap();
        let first = store
            .new_token(user.id, TokenScope::Activation, chrono::Duration::hours(48))
            .await
            .unwrap();
        let second = store
            .new_token(user.id, TokenScope::Activation, chrono::Duration::hours(48))
            .await
            .unwrap();

        assert_eq!(store.token_count(), 1);
        assert!(store
            .get_for_token(TokenScope::Activation, &first.hash)
            .await
            .is_err());
        assert!(store
            .get_for_token(TokenScope::Activation, &second.hash)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn permissions_accumulate() {
        let store = MemoryStore::new();
        let owner = UserId(9);
        assert!(store.all_codes_for_owner(owner).await.unwrap().is_empty());

        store.add_for_owner(owner, &[MOVIES_READ]).await.unwrap();
        store.add_for_owner(owner, &[MOVIES_READ, MOVIES_WRITE]).await.unwrap();
        let perms = store.all_codes_for_owner(owner).await.unwrap();
        assert!(perms.includes(MOVIES_READ));
        assert!(perms.includes(MOVIES_WRITE));
    }
}
