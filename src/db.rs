use mongodb::{options::ClientOptions, Client, Collection, Database};

/// Shared Mongo handle: one client for the process, one logical database.
pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        MongoDB { client, db }
    }

    /// Typed access to one of the fixed collections (`users`, `posts`,
    /// `conversations`, `messages`, `matches`, `ratings`).
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection::<T>(name)
    }
}
