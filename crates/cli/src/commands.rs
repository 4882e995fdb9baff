use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a query description to SQL without a database
    Sql {
        #[arg(long, help = "Query description file (JSON)")]
        query: String,

        #[arg(long, default_value = "postgres", help = "SQL dialect: postgres, mysql, sqlite")]
        dialect: String,

        #[arg(long, help = "Schema file mapping table names to column lists (JSON)")]
        schema: String,

        #[arg(long, help = "Extra condition appended to the query")]
        filter: Option<String>,

        #[arg(long, help = "Project primary keys only")]
        pks: bool,
    },
    /// Print the formula used to rebuild nested results from rows
    Formula {
        #[arg(long, help = "Query description file (JSON)")]
        query: String,
    },
    /// Print the parsed node tree
    Tree {
        #[arg(long, help = "Query description file (JSON)")]
        query: String,
    },
    /// Run a read against a live database and print the nested result
    Select {
        #[arg(long, help = "Query description file (JSON)")]
        query: String,

        #[arg(long, env = "DATABASE_URL", help = "Database connection URL")]
        url: String,

        #[arg(long, help = "Extra condition appended to the query")]
        filter: Option<String>,

        #[arg(long, help = "Print distinct primary keys per table instead of objects")]
        pks: bool,
    },
    /// Run an insert, update or delete description with a JSON payload
    Mutate {
        #[arg(long, help = "Mutation description file (JSON)")]
        query: String,

        #[arg(long, help = "Payload file: one object or a list of objects (JSON)")]
        data: String,

        #[arg(long, env = "DATABASE_URL", help = "Database connection URL")]
        url: String,
    },
}
