use cucumber::World;
use log::*;
use recon_engine::{
    capture::Verdict,
    jobs::JobError,
    test_utils::{
        fakes::RecordingProcessor,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    ProcessorContext,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct ReconWorld {
    pub system: Option<ReconSystem>,
}

#[derive(Debug)]
pub struct ReconSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub context: ProcessorContext,
    pub processor: RecordingProcessor,
    pub last_result: Option<Result<Verdict, JobError>>,
}

impl ReconWorld {
    pub fn system(&self) -> &ReconSystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn system_mut(&mut self) -> &mut ReconSystem {
        self.system.as_mut().expect("System not initialised")
    }

    pub fn db(&self) -> &SqliteDatabase {
        &self.system().db
    }
}

impl ReconSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        Self {
            db_path: url,
            db,
            context: ProcessorContext::new("x"),
            processor: RecordingProcessor::new("x"),
            last_result: None,
        }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
