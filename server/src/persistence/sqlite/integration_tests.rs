//! Repository-level tests against real SQLite databases.

use std::sync::Arc;

use repertoire::{
    Color, MoveCategory, MoveNode, MoveSubmission, NewOpening, Opening, OpeningId, PracticeMode,
    PracticeSession, Repertoire, RepertoireId, SessionId, Stats, UserId, STARTING_FEN,
};

use super::{Database, SqlitePracticeSessionRepository};
use crate::accounts::{User, UserPreferences};
use crate::persistence::traits::{
    PracticeSessionRepository, RepertoireRepository, UserRepository,
};
use crate::persistence::{now, PersistenceError};

const E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
const D4: &str = "rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq d3 0 1";
const E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";

fn sample_opening(name: &str, first: (&str, &str, &str)) -> Opening {
    let mut opening = NewOpening::new(name);
    let (san, uci, fen) = first;
    opening
        .moves
        .insert(None, MoveNode::new(san, uci, fen).main_line())
        .unwrap();
    opening.into_opening(OpeningId::new())
}

fn sample_repertoire(owner: UserId, color: Color) -> Repertoire {
    let mut repertoire = Repertoire::new(owner, "Main", color, now());
    repertoire
        .openings
        .push(sample_opening("King's Pawn", ("e4", "e2e4", E4)));
    repertoire
}

fn sample_session(owner: UserId, repertoire_id: RepertoireId) -> PracticeSession {
    PracticeSession::start(
        owner,
        repertoire_id,
        None,
        PracticeMode::Random,
        Color::White,
        None,
        now(),
    )
}

fn sample_user(email: &str) -> User {
    let ts = now();
    User {
        id: UserId::new(),
        email: email.to_string(),
        username: "tester".to_string(),
        password_hash: "hash".to_string(),
        preferences: UserPreferences::default(),
        created_at: ts,
        updated_at: ts,
    }
}

// ---------- Repertoires ----------

#[tokio::test]
async fn test_repertoire_roundtrip_with_tree() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let owner = UserId::new();
    let mut repertoire = sample_repertoire(owner, Color::White);
    let opening = &mut repertoire.openings[0];
    let root = opening.moves.roots()[0];
    opening
        .moves
        .insert(Some(root), MoveNode::new("e5", "e7e5", E4_E5).with_comment("Open game"))
        .unwrap();
    repo.insert_repertoire(&repertoire).await.unwrap();

    let loaded = repo.load_owned(repertoire.id, owner).await.unwrap().unwrap();
    assert_eq!(loaded, repertoire);
    assert_eq!(loaded.openings[0].moves.len(), 2);
}

#[tokio::test]
async fn test_foreign_repertoire_is_invisible() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let owner = UserId::new();
    let repertoire = sample_repertoire(owner, Color::White);
    repo.insert_repertoire(&repertoire).await.unwrap();

    let stranger = UserId::new();
    assert!(repo.load_owned(repertoire.id, stranger).await.unwrap().is_none());
    assert!(repo.list_by_owner(stranger).await.unwrap().is_empty());
    assert!(!repo.delete_repertoire(repertoire.id, stranger).await.unwrap());

    let opening = sample_opening("Queen's Pawn", ("d4", "d2d4", D4));
    let err = repo
        .insert_opening(repertoire.id, stranger, &opening, now())
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(_)));
}

#[tokio::test]
async fn test_list_by_color_filters() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let owner = UserId::new();
    let white = sample_repertoire(owner, Color::White);
    let black = sample_repertoire(owner, Color::Black);
    repo.insert_repertoire(&white).await.unwrap();
    repo.insert_repertoire(&black).await.unwrap();

    let listed = repo.list_by_color(owner, Color::Black).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, black.id);
    assert_eq!(repo.list_by_owner(owner).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_save_is_version_guarded() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let owner = UserId::new();
    let repertoire = sample_repertoire(owner, Color::White);
    repo.insert_repertoire(&repertoire).await.unwrap();

    let mut first = repo.load_owned(repertoire.id, owner).await.unwrap().unwrap();
    let mut second = first.clone();

    first.name = "Renamed".into();
    first
        .openings
        .push(sample_opening("Queen's Pawn", ("d4", "d2d4", D4)));
    let version = repo.save_repertoire(&first).await.unwrap();
    assert_eq!(version, first.version() + 1);

    second.name = "Lost update".into();
    let err = repo.save_repertoire(&second).await.unwrap_err();
    assert!(matches!(err, PersistenceError::VersionConflict));

    let stored = repo.load_owned(repertoire.id, owner).await.unwrap().unwrap();
    assert_eq!(stored.name, "Renamed");
    assert_eq!(stored.openings.len(), 2);
    assert_eq!(stored.version(), version);
}

#[tokio::test]
async fn test_save_missing_repertoire_is_not_found() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let repertoire = sample_repertoire(UserId::new(), Color::White);
    let err = repo.save_repertoire(&repertoire).await.unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(_)));
}

#[tokio::test]
async fn test_opening_writes_bump_version() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let owner = UserId::new();
    let repertoire = sample_repertoire(owner, Color::White);
    repo.insert_repertoire(&repertoire).await.unwrap();
    let before = repertoire.version();

    let opening = sample_opening("Queen's Pawn", ("d4", "d2d4", D4));
    repo.insert_opening(repertoire.id, owner, &opening, now())
        .await
        .unwrap();
    let stored = repo.load_owned(repertoire.id, owner).await.unwrap().unwrap();
    assert_eq!(stored.version(), before + 1);
    assert_eq!(stored.openings[1], opening);
}

#[tokio::test]
async fn test_replace_and_delete_opening() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let owner = UserId::new();
    let repertoire = sample_repertoire(owner, Color::White);
    repo.insert_repertoire(&repertoire).await.unwrap();
    let original = repertoire.openings[0].clone();

    let mut renamed = original.clone();
    renamed.name = "Open Games".into();
    assert!(repo
        .replace_opening(repertoire.id, owner, &renamed, now())
        .await
        .unwrap());

    let unknown = sample_opening("Ghost", ("d4", "d2d4", D4));
    assert!(!repo
        .replace_opening(repertoire.id, owner, &unknown, now())
        .await
        .unwrap());

    let stored = repo.load_owned(repertoire.id, owner).await.unwrap().unwrap();
    assert_eq!(stored.openings, vec![renamed.clone()]);

    let removed = repo
        .delete_opening(repertoire.id, owner, original.id, now())
        .await
        .unwrap();
    assert_eq!(removed, Some(renamed));
    let again = repo
        .delete_opening(repertoire.id, owner, original.id, now())
        .await
        .unwrap();
    assert_eq!(again, None);
}

#[tokio::test]
async fn test_delete_repertoire_cascades_openings() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.repertoires();
    let owner = UserId::new();
    let repertoire = sample_repertoire(owner, Color::White);
    repo.insert_repertoire(&repertoire).await.unwrap();

    assert!(repo.delete_repertoire(repertoire.id, owner).await.unwrap());
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM openings")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ---------- Practice sessions ----------

#[tokio::test]
async fn test_session_roundtrip() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.practice_sessions();
    let owner = UserId::new();
    let session = sample_session(owner, RepertoireId::new());
    repo.create_session(&session).await.unwrap();

    let loaded = repo.load_session(session.id, owner).await.unwrap().unwrap();
    assert_eq!(loaded, session);
    assert!(repo
        .load_session(session.id, UserId::new())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_append_assigns_next_ply() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.practice_sessions();
    let owner = UserId::new();
    let session = sample_session(owner, RepertoireId::new());
    repo.create_session(&session).await.unwrap();

    let mut with_expected = MoveSubmission::new(STARTING_FEN, D4, "d4", MoveCategory::Inaccuracy);
    with_expected.expected_move = Some(" e4 ".into());
    with_expected.centipawn_loss = 40;

    let first = repo
        .append_move(session.id, owner, &MoveSubmission::new(STARTING_FEN, E4, "e4", MoveCategory::Repertoire))
        .await
        .unwrap();
    let second = repo.append_move(session.id, owner, &with_expected).await.unwrap();
    assert_eq!((first.ply, second.ply), (1, 2));
    assert_eq!(second.expected_move.as_deref(), Some("e4"));

    let loaded = repo.load_session(session.id, owner).await.unwrap().unwrap();
    assert_eq!(loaded.moves, vec![first, second]);
    assert_eq!(loaded.moves[0].category, MoveCategory::Repertoire);
}

#[tokio::test]
async fn test_append_rejections() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.practice_sessions();
    let owner = UserId::new();
    let session = sample_session(owner, RepertoireId::new());
    repo.create_session(&session).await.unwrap();
    let mv = MoveSubmission::new(STARTING_FEN, E4, "e4", MoveCategory::Book);

    let err = repo.append_move(session.id, UserId::new(), &mv).await.unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(_)));
    let err = repo.append_move(SessionId::new(), owner, &mv).await.unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(_)));

    repo.finalize_session(session.id, owner, 0, now(), &Stats::default())
        .await
        .unwrap();
    let err = repo.append_move(session.id, owner, &mv).await.unwrap_err();
    assert!(matches!(err, PersistenceError::SessionEnded));
}

#[tokio::test]
async fn test_finalize_guards() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.practice_sessions();
    let owner = UserId::new();
    let session = sample_session(owner, RepertoireId::new());
    repo.create_session(&session).await.unwrap();
    repo.append_move(
        session.id,
        owner,
        &MoveSubmission::new(STARTING_FEN, E4, "e4", MoveCategory::Best),
    )
    .await
    .unwrap();

    // Computed over a stale move list.
    let err = repo
        .finalize_session(session.id, owner, 0, now(), &Stats::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::StaleSession));

    let stats = Stats {
        total_moves: 1,
        best_moves: 1,
        accuracy_percentage: 100.0,
        ..Stats::default()
    };
    let ended_at = now();
    repo.finalize_session(session.id, owner, 1, ended_at, &stats)
        .await
        .unwrap();
    let err = repo
        .finalize_session(session.id, owner, 1, now(), &Stats::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::SessionEnded));

    let loaded = repo.load_session(session.id, owner).await.unwrap().unwrap();
    assert_eq!(loaded.ended_at, Some(ended_at));
    assert_eq!(loaded.stats, stats);
}

#[tokio::test]
async fn test_concurrent_appends_keep_plies_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("appends.db"), 4).await.unwrap();
    let repo: Arc<SqlitePracticeSessionRepository> = Arc::new(db.practice_sessions());
    let owner = UserId::new();
    let session = sample_session(owner, RepertoireId::new());
    repo.create_session(&session).await.unwrap();
    let session_id = session.id;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                repo.append_move(
                    session_id,
                    owner,
                    &MoveSubmission::new(STARTING_FEN, E4, "e4", MoveCategory::Good),
                )
                .await
            })
        })
        .collect();
    let mut plies = Vec::new();
    for task in tasks {
        plies.push(task.await.unwrap().unwrap().ply);
    }
    plies.sort_unstable();
    assert_eq!(plies, (1..=8).collect::<Vec<u32>>());

    let loaded = repo.load_session(session.id, owner).await.unwrap().unwrap();
    assert_eq!(loaded.moves.len(), 8);
}

#[tokio::test]
async fn test_history_ordering() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.practice_sessions();
    let owner = UserId::new();
    let repertoire_id = RepertoireId::new();

    // Same timestamp for all three; insertion order breaks the tie.
    let started_at = now();
    let mut ids = Vec::new();
    for i in 0..3 {
        let mut session = sample_session(owner, if i == 1 { RepertoireId::new() } else { repertoire_id });
        session.started_at = started_at;
        repo.create_session(&session).await.unwrap();
        ids.push(session.id);
    }

    let history: Vec<_> = repo
        .history(owner, 50)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(history, vec![ids[2], ids[1], ids[0]]);
    assert_eq!(repo.history(owner, 1).await.unwrap().len(), 1);

    let for_repertoire: Vec<_> = repo
        .history_for_repertoire(owner, repertoire_id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(for_repertoire, vec![ids[2], ids[0]]);
}

// ---------- Users ----------

#[tokio::test]
async fn test_user_email_is_unique() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.users();
    let user = sample_user("ana@example.com");
    repo.insert_user(&user).await.unwrap();

    let err = repo
        .insert_user(&sample_user("ana@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Duplicate("user")));

    let found = repo.find_by_email("ana@example.com").await.unwrap().unwrap();
    assert_eq!(found, user);
    assert_eq!(repo.find_by_id(user.id).await.unwrap(), Some(user));
}

#[tokio::test]
async fn test_update_preferences() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = db.users();
    let user = sample_user("kim@example.com");
    repo.insert_user(&user).await.unwrap();

    let prefs = UserPreferences {
        board_theme: "blue".into(),
        piece_set: "merida".into(),
        board_orientation: Color::Black,
    };
    assert!(repo.update_preferences(user.id, &prefs, now()).await.unwrap());
    assert!(!repo
        .update_preferences(UserId::new(), &prefs, now())
        .await
        .unwrap());

    let stored = repo.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(stored.preferences, prefs);
}
