use serde_json::{Value, json};
use tempfile::tempdir;

use tasklane::config::Config;
use tasklane::error::TasklaneError;
use tasklane::rpc::{Context, dispatch};
use tasklane::store::Db;
use tasklane::store::workspace::Workspace;

struct Client<'a> {
    db: &'a Db,
    config: &'a Config,
}

impl<'a> Client<'a> {
    fn call(&self, token: Option<&str>, procedure: &str, input: Value) -> Result<Value, TasklaneError> {
        let ctx = Context {
            db: self.db,
            config: self.config,
            token,
        };
        dispatch(&ctx, procedure, input)
    }

    fn ok(&self, token: &str, procedure: &str, input: Value) -> Value {
        self.call(Some(token), procedure, input)
            .unwrap_or_else(|e| panic!("{procedure} failed: {e}"))
    }

    fn err(&self, token: &str, procedure: &str, input: Value) -> &'static str {
        match self.call(Some(token), procedure, input) {
            Ok(value) => panic!("{procedure} unexpectedly succeeded: {value}"),
            Err(e) => e.code(),
        }
    }

    /// Register (or, when registration is closed, fail) and log in.
    fn sign_up(&self, name: &str) -> (i64, String) {
        let email = format!("{}@example.com", name.to_lowercase());
        let user = self
            .call(
                None,
                "auth.register",
                json!({ "email": email, "name": name, "password": "long enough pw" }),
            )
            .unwrap();
        let login = self
            .call(
                None,
                "auth.login",
                json!({ "email": email, "password": "long enough pw" }),
            )
            .unwrap();
        (
            user["id"].as_i64().unwrap(),
            login["token"].as_str().unwrap().to_string(),
        )
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.auth.hash_iterations = 1_000;
    config
}

#[test]
fn test_project_task_workflow() {
    let db = Db::open_memory().unwrap();
    let config = fast_config();
    let client = Client {
        db: &db,
        config: &config,
    };

    let (_, ada) = client.sign_up("Ada");
    let (grace_id, grace) = client.sign_up("Grace");
    let (_, linus) = client.sign_up("Linus");

    // Ada owns a project and brings Grace in
    let project = client.ok(&ada, "project.create", json!({ "name": "Compiler" }));
    let project_id = project["id"].as_i64().unwrap();
    client.ok(
        &ada,
        "project.add_member",
        json!({ "project_id": project_id, "user_id": grace_id }),
    );

    let milestone = client.ok(
        &ada,
        "milestone.create",
        json!({ "project_id": project_id, "title": "Parser", "due_date": "2030-01-31" }),
    );
    let task = client.ok(
        &ada,
        "task.create",
        json!({
            "project_id": project_id,
            "title": "  Write the lexer ",
            "priority": "high",
            "milestone_id": milestone["id"],
            "assignees": [grace_id],
        }),
    );
    let task_id = task["id"].as_i64().unwrap();
    assert_eq!(task["title"], "Write the lexer");
    assert_eq!(task["status"], "todo");

    // Grace sees it in her list and drives it to review
    let mine = client.ok(&grace, "task.mine", json!({}));
    assert_eq!(mine.as_array().unwrap().len(), 1);
    client.ok(
        &grace,
        "task.set_status",
        json!({ "task_id": task_id, "status": "in_progress" }),
    );
    client.ok(
        &grace,
        "task.set_status",
        json!({ "task_id": task_id, "status": "in_review" }),
    );
    assert_eq!(
        client.err(
            &grace,
            "task.set_status",
            json!({ "task_id": task_id, "status": "todo" })
        ),
        "invalid_transition"
    );

    client.ok(
        &grace,
        "comment.create",
        json!({ "task_id": task_id, "body": "ready for a look" }),
    );
    let comments = client.ok(&ada, "comment.list", json!({ "task_id": task_id }));
    assert_eq!(comments[0]["body"], "ready for a look");

    // Linus is outside the project and cannot see any of it
    assert_eq!(
        client.err(&linus, "task.get", json!({ "task_id": task_id })),
        "task_not_found"
    );
    assert_eq!(
        client.err(&linus, "project.get", json!({ "project_id": project_id })),
        "project_not_found"
    );
    let visible = client.ok(&linus, "project.list", json!({}));
    assert!(visible.as_array().unwrap().is_empty());

    // Activity is newest first
    let activity = client.ok(
        &ada,
        "project.activity",
        json!({ "project_id": project_id, "limit": 3 }),
    );
    let events: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        events,
        vec!["comment.added", "task.status_changed", "task.status_changed"]
    );
}

#[test]
fn test_time_tracking_flow() {
    let db = Db::open_memory().unwrap();
    let config = fast_config();
    let client = Client {
        db: &db,
        config: &config,
    };
    let (_, ada) = client.sign_up("Ada");
    let (grace_id, grace) = client.sign_up("Grace");

    let project = client.ok(&ada, "project.create", json!({ "name": "Ops" }));
    let project_id = project["id"].as_i64().unwrap();
    client.ok(
        &ada,
        "project.add_member",
        json!({ "project_id": project_id, "user_id": grace_id }),
    );
    let task = client.ok(
        &ada,
        "task.create",
        json!({ "project_id": project_id, "title": "Rotate keys", "assignees": [grace_id] }),
    );
    let task_id = task["id"].as_i64().unwrap();

    client.ok(
        &grace,
        "time.log",
        json!({ "task_id": task_id, "minutes": 45, "note": "prep" }),
    );

    let running = client.ok(&grace, "time.start", json!({ "task_id": task_id }));
    assert!(running["ended_at"].is_null());
    assert_eq!(
        client.err(&grace, "time.start", json!({ "task_id": task_id })),
        "timer_running"
    );
    assert_eq!(
        client.err(
            &grace,
            "time.update",
            json!({ "entry_id": running["id"], "minutes": 5 })
        ),
        "timer_running"
    );
    let stopped = client.ok(&grace, "time.stop", Value::Null);
    assert_eq!(stopped["minutes"], 1);
    assert!(client.ok(&grace, "time.running", json!({})).is_null());
    assert_eq!(client.err(&grace, "time.stop", json!({})), "no_running_timer");

    let totals = client.ok(&ada, "time.summary", json!({ "project_id": project_id }));
    assert_eq!(totals["total_minutes"], 46);
    assert_eq!(totals["by_user"][0]["user_id"], grace_id);

    // Administrators may correct anyone's entry
    let corrected = client.ok(
        &ada,
        "time.update",
        json!({ "entry_id": stopped["id"], "minutes": 10 }),
    );
    assert_eq!(corrected["minutes"], 10);
    let totals = client.ok(&grace, "time.summary", json!({ "project_id": project_id }));
    assert_eq!(totals["total_minutes"], 55);
}

#[test]
fn test_admin_controls_accounts() {
    let db = Db::open_memory().unwrap();
    let config = fast_config();
    let client = Client {
        db: &db,
        config: &config,
    };
    let (ada_id, ada) = client.sign_up("Ada");
    let (grace_id, grace) = client.sign_up("Grace");

    assert_eq!(client.ok(&ada, "auth.me", json!({}))["role"], "admin");
    assert_eq!(client.err(&grace, "admin.list_users", json!({})), "forbidden");

    // The only admin cannot demote themselves
    assert_eq!(
        client.err(
            &ada,
            "admin.set_role",
            json!({ "user_id": ada_id, "role": "member" })
        ),
        "last_admin"
    );

    // Disabling an account ends its sessions
    client.ok(
        &ada,
        "admin.set_active",
        json!({ "user_id": grace_id, "active": false }),
    );
    assert_eq!(client.err(&grace, "auth.me", json!({})), "unauthorized");
    let login = client.call(
        None,
        "auth.login",
        json!({ "email": "grace@example.com", "password": "long enough pw" }),
    );
    assert_eq!(login.unwrap_err().code(), "account_disabled");

    client.ok(&ada, "auth.logout", json!({}));
    assert_eq!(client.err(&ada, "auth.me", json!({})), "unauthorized");
}

#[test]
fn test_closed_registration_in_workspace() {
    let dir = tempdir().unwrap();
    let ws = Workspace::init(dir.path()).unwrap();
    std::fs::write(
        ws.dir.join("config.toml"),
        "[auth]\nallow_registration = false\nhash_iterations = 1000\n",
    )
    .unwrap();
    drop(ws);

    let ws = Workspace::open(dir.path()).unwrap();
    assert!(!ws.config.auth.allow_registration);
    let client = Client {
        db: &ws.db,
        config: &ws.config,
    };

    // The first account is always allowed so the workspace gets an admin
    client.sign_up("Ada");
    let second = client.call(
        None,
        "auth.register",
        json!({ "email": "bob@example.com", "name": "Bob", "password": "long enough pw" }),
    );
    assert_eq!(second.unwrap_err().code(), "registration_closed");
}
