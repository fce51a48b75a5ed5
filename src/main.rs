//! Library client - command-line front end
//!
//! Each subcommand is one screen or action of the library application.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_client::{
    config::AppConfig,
    models::{BookForm, BookFormat, BookPatch, BookType},
    routes::{guard_settled, Access, Route},
    screens, ClientError, Services,
};

#[derive(Parser, Debug)]
#[command(name = "library-client", version, about = "Browse and manage the library")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and remember the session
    Login { username: String, password: String },
    /// Create an account
    Register { username: String, password: String },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List books, optionally filtered by title or author
    Books {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one book
    Book { id: i64 },
    /// List the books you are borrowing
    MyBooks,
    /// Add a book
    Create(BookArgs),
    /// Replace every field of a book
    Edit {
        id: i64,
        #[command(flatten)]
        book: BookArgs,
    },
    /// Change some fields of a book
    Patch {
        id: i64,
        #[command(flatten)]
        fields: PatchArgs,
    },
    /// Delete a book
    Delete { id: i64 },
    /// Borrow a book
    Borrow { id: i64 },
    /// Return a borrowed book
    Return { id: i64 },
}

#[derive(Args, Debug)]
struct BookArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    author: String,
    #[arg(long)]
    isbn: String,
    /// Publication date, YYYY-MM-DD
    #[arg(long)]
    published: NaiveDate,
    #[arg(long = "type", default_value = "printed")]
    book_type: BookType,
    #[arg(long)]
    pages: Option<u32>,
    #[arg(long)]
    file_format: Option<String>,
    /// Running time in minutes
    #[arg(long)]
    duration: Option<u32>,
    #[arg(long)]
    unavailable: bool,
}

fn format_of(
    book_type: BookType,
    pages: Option<u32>,
    file_format: Option<String>,
    duration: Option<u32>,
) -> BookFormat {
    match book_type {
        BookType::Printed => BookFormat::Printed { pages },
        BookType::Ebook => BookFormat::Ebook { file_format },
        BookType::Audiobook => BookFormat::Audiobook { duration },
    }
}

impl BookArgs {
    fn into_form(self) -> BookForm {
        let format = format_of(self.book_type, self.pages, self.file_format, self.duration);

        BookForm {
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            published_date: self.published,
            available: !self.unavailable,
            format,
        }
    }
}

#[derive(Args, Debug)]
struct PatchArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    isbn: Option<String>,
    #[arg(long)]
    published: Option<NaiveDate>,
    #[arg(long)]
    available: Option<bool>,
    /// Change the book type; its attribute is taken from the flags below
    #[arg(long = "type")]
    book_type: Option<BookType>,
    #[arg(long, requires = "book_type")]
    pages: Option<u32>,
    #[arg(long, requires = "book_type")]
    file_format: Option<String>,
    /// Running time in minutes
    #[arg(long, requires = "book_type")]
    duration: Option<u32>,
}

impl From<PatchArgs> for BookPatch {
    fn from(args: PatchArgs) -> Self {
        let format = args
            .book_type
            .map(|book_type| format_of(book_type, args.pages, args.file_format, args.duration));

        BookPatch {
            title: args.title,
            author: args.author,
            isbn: args.isbn,
            published_date: args.published,
            available: args.available,
            format,
        }
    }
}

impl Command {
    fn route(&self) -> Route {
        match self {
            Command::Login { .. } | Command::Logout => Route::Login,
            Command::Register { .. } => Route::Register,
            Command::Whoami | Command::Books { .. } => Route::Dashboard,
            Command::Book { id } | Command::Borrow { id } | Command::Return { id } | Command::Delete { id } => {
                Route::BookDetails(*id)
            }
            Command::MyBooks => Route::MyBooks,
            Command::Create(_) => Route::NewBook,
            Command::Edit { id, .. } | Command::Patch { id, .. } => Route::EditBook(*id),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("library_client={}", config.logging.level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Library client v{} against {}", env!("CARGO_PKG_VERSION"), config.api.base_url);

    let cli = Cli::parse();
    let services = Services::new(&config)?;

    match run(&services, cli.command).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run(services: &Services, command: Command) -> Result<(), ClientError> {
    if let Err(e) = services.session.restore().await {
        // Expired or unreadable sessions fall back to anonymous use
        tracing::debug!("Session not restored: {}", e);
    }

    let route = command.route();
    match guard_settled(&mut services.session.subscribe(), route).await {
        Access::Render(_) => {}
        Access::Redirect(to) => {
            return Err(ClientError::Auth(format!(
                "Please log in first (redirected to {})",
                to
            )));
        }
        Access::Loading => {
            return Err(ClientError::Auth("Session is still being resolved".to_string()));
        }
    }

    let books = &services.books;
    match command {
        Command::Login { username, password } => {
            let navigation = services.session.login(&username, &password).await?;
            println!("{}", navigation.notice);
        }
        Command::Register { username, password } => {
            let navigation = services.session.register(&username, &password).await?;
            println!("{}", navigation.notice);
        }
        Command::Logout => {
            let navigation = services.session.logout().await;
            println!("{}", navigation.notice);
        }
        Command::Whoami => {
            if let Some(user) = services.session.user() {
                print!("{}", screens::user_summary(&user));
            }
        }
        Command::Books { search } => {
            let list = books.list_books(search.as_deref()).await?;
            print!("{}", screens::dashboard(&list, search.as_deref()));
        }
        Command::Book { id } => {
            let book = books.get_book(id).await?;
            if let Some(user) = services.session.user() {
                print!("{}", screens::book_details(&book, &user));
            }
        }
        Command::MyBooks => {
            let mine = books.my_books().await?;
            print!("{}", screens::my_books(&mine));
        }
        Command::Create(args) => {
            let book = books.create_book(&args.into_form()).await?;
            println!("Book created successfully (id {})", book.id);
        }
        Command::Edit { id, book } => {
            books.update_book(id, &book.into_form()).await?;
            println!("Book updated successfully");
        }
        Command::Patch { id, fields } => {
            books.patch_book(id, &fields.into()).await?;
            println!("Book updated successfully");
        }
        Command::Delete { id } => {
            books.delete_book(id).await?;
            println!("Book deleted successfully");
        }
        Command::Borrow { id } => {
            let message = books.borrow_book(id).await?;
            println!("{}", message.text_or("Book borrowed successfully"));
        }
        Command::Return { id } => {
            let message = books.return_book(id).await?;
            println!("{}", message.text_or("Book returned successfully"));
        }
    }

    Ok(())
}
