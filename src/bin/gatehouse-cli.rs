use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "gatehouse-cli")]
#[command(about = "Command-line client for the gatehouse movie API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4000")]
    url: String,

    /// Bearer token from `login`.
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service health
    Health,
    /// Register a new user
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Activate a user with the token returned by `register`
    Activate {
        token: String,
    },
    /// Exchange email and password for an authentication token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Work with movies
    Movie {
        #[command(subcommand)]
        command: MovieCommands,
    },
    /// Work with user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    Get {
        id: i64,
    },
    /// Change your own account; only the given fields are sent
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        expected_version: Option<u32>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum MovieCommands {
    /// Search the catalogue
    List {
        /// Words that must all appear in the title
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_delimiter = ',')]
        genres: Vec<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        /// id, title, runtime or year; prefix with '-' for descending
        #[arg(long, allow_hyphen_values = true)]
        sort: Option<String>,
    },
    Get {
        id: i64,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        year: Option<i32>,
        /// Runtime in minutes
        #[arg(long)]
        runtime: Option<u32>,
        #[arg(long, value_delimiter = ',')]
        genres: Vec<String>,
    },
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        runtime: Option<u32>,
        #[arg(long, value_delimiter = ',')]
        genres: Option<Vec<String>>,
        /// Refuse the update unless the movie is still at this version
        #[arg(long)]
        expected_version: Option<u32>,
    },
    Delete {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    let url = |path: &str| format!("{}{}", cli.url.trim_end_matches('/'), path);

    let request = match cli.command {
        Commands::Health => client.get(url("/v1/healthcheck")),
        Commands::Register { name, email, password } => client
            .post(url("/v1/users"))
            .json(&json!({ "name": name, "email": email, "password": password })),
        Commands::Activate { token } => client
            .put(url("/v1/users/activated"))
            .json(&json!({ "token": token })),
        Commands::Login { email, password } => client
            .post(url("/v1/tokens/authentication"))
            .json(&json!({ "email": email, "password": password })),
        Commands::Movie { command } => match command {
            MovieCommands::List {
                title,
                genres,
                page,
                page_size,
                sort,
            } => {
                let mut query: Vec<(&str, String)> = Vec::new();
                if let Some(title) = title {
                    query.push(("title", title));
                }
                if !genres.is_empty() {
                    query.push(("genres", genres.join(",")));
                }
                if let Some(page) = page {
                    query.push(("page", page.to_string()));
                }
                if let Some(page_size) = page_size {
                    query.push(("page_size", page_size.to_string()));
                }
                if let Some(sort) = sort {
                    query.push(("sort", sort));
                }
                client.get(url("/v1/movies")).query(&query)
            }
            MovieCommands::Get { id } => client.get(url(&format!("/v1/movies/{id}"))),
            MovieCommands::Create {
                title,
                year,
                runtime,
                genres,
            } => {
                let body = movie_body(Some(title), year, runtime, Some(genres));
                client.post(url("/v1/movies")).json(&body)
            }
            MovieCommands::Update {
                id,
                title,
                year,
                runtime,
                genres,
                expected_version,
            } => {
                let body = movie_body(title, year, runtime, genres);
                let mut request = client.patch(url(&format!("/v1/movies/{id}"))).json(&body);
                if let Some(version) = expected_version {
                    request = request.header("X-Expected-Version", version.to_string());
                }
                request
            }
            MovieCommands::Delete { id } => client.delete(url(&format!("/v1/movies/{id}"))),
        },
        Commands::User { command } => match command {
            UserCommands::Get { id } => client.get(url(&format!("/v1/users/{id}"))),
            UserCommands::Update {
                id,
                name,
                email,
                password,
                expected_version,
            } => {
                let mut body = Map::new();
                for (key, value) in [("name", name), ("email", email), ("password", password)] {
                    if let Some(value) = value {
                        body.insert(key.into(), value.into());
                    }
                }
                let mut request = client
                    .patch(url(&format!("/v1/users/{id}")))
                    .json(&Value::Object(body));
                if let Some(version) = expected_version {
                    request = request.header("X-Expected-Version", version.to_string());
                }
                request
            }
            UserCommands::Delete { id } => client.delete(url(&format!("/v1/users/{id}"))),
        },
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

fn movie_body(
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<u32>,
    genres: Option<Vec<String>>,
) -> Value {
    let mut body = Map::new();
    if let Some(title) = title {
        body.insert("title".into(), title.into());
    }
    if let Some(year) = year {
        body.insert("year".into(), year.into());
    }
    if let Some(runtime) = runtime {
        body.insert("runtime".into(), format!("{runtime} mins").into());
    }
    if let Some(genres) = genres.filter(|g| !g.is_empty()) {
        body.insert("genres".into(), genres.into());
    }
    Value::Object(body)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) if text.is_empty() => status.to_string(),
        Err(_) => text,
    };

    if status.is_success() {
        println!("{rendered}");
    } else {
        eprintln!("Error: API returned status {status}");
        eprintln!("{rendered}");
        std::process::exit(1);
    }
    Ok(())
}
