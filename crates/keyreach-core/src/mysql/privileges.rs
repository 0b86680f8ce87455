/// A level of the privilege containment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Global,
    Database,
    Table,
    Column,
    Routine,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Global,
        Level::Database,
        Level::Table,
        Level::Column,
        Level::Routine,
    ];

    /// Resource type used when the level is bound onto the resource graph.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Level::Global => "server",
            Level::Database => "database",
            Level::Table => "table",
            Level::Column => "column",
            Level::Routine => "routine",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeScope {
    pub global: bool,
    pub database: bool,
    pub table: bool,
    pub column: bool,
    pub routine: bool,
}

impl PrivilegeScope {
    pub fn allows(&self, level: Level) -> bool {
        match level {
            Level::Global => self.global,
            Level::Database => self.database,
            Level::Table => self.table,
            Level::Column => self.column,
            Level::Routine => self.routine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeDef {
    pub name: &'static str,
    pub scope: PrivilegeScope,
}

const fn def(
    name: &'static str,
    global: bool,
    database: bool,
    table: bool,
    column: bool,
    routine: bool,
) -> PrivilegeDef {
    PrivilegeDef {
        name,
        scope: PrivilegeScope {
            global,
            database,
            table,
            column,
            routine,
        },
    }
}

pub const USAGE: &str = "USAGE";
pub const GRANT_OPTION: &str = "GRANT OPTION";
pub const PROXY: &str = "PROXY";

/// Static privileges.                  global database table  column routine
pub static STATIC_PRIVILEGES: &[PrivilegeDef] = &[
    def("ALTER",                          true, true,  true,  false, false),
    def("ALTER ROUTINE",                  true, true,  false, false, true),
    def("CREATE",                         true, true,  true,  false, false),
    def("CREATE ROLE",                    true, false, false, false, false),
    def("CREATE ROUTINE",                 true, true,  false, false, false),
    def("CREATE TABLESPACE",              true, false, false, false, false),
    def("CREATE TEMPORARY TABLES",        true, true,  false, false, false),
    def("CREATE USER",                    true, false, false, false, false),
    def("CREATE VIEW",                    true, true,  true,  false, false),
    def("DELETE",                         true, true,  true,  false, false),
    def("DROP",                           true, true,  true,  false, false),
    def("DROP ROLE",                      true, false, false, false, false),
    def("EVENT",                          true, true,  false, false, false),
    def("EXECUTE",                        true, true,  false, false, true),
    def("FILE",                           true, false, false, false, false),
    def(GRANT_OPTION,                     true, true,  true,  false, true),
    def("INDEX",                          true, true,  true,  false, false),
    def("INSERT",                         true, true,  true,  true,  false),
    def("LOCK TABLES",                    true, true,  false, false, false),
    def("PROCESS",                        true, false, false, false, false),
    def(PROXY,                            false, false, false, false, false),
    def("REFERENCES",                     true, true,  true,  true,  false),
    def("RELOAD",                         true, false, false, false, false),
    def("REPLICATION CLIENT",             true, false, false, false, false),
    def("REPLICATION SLAVE",              true, false, false, false, false),
    def("SELECT",                         true, true,  true,  true,  false),
    def("SHOW DATABASES",                 true, false, false, false, false),
    def("SHOW VIEW",                      true, true,  true,  false, false),
    def("SHUTDOWN",                       true, false, false, false, false),
    def("SUPER",                          true, false, false, false, false),
    def("TRIGGER",                        true, true,  true,  false, false),
    def("UPDATE",                         true, true,  true,  true,  false),
    def(USAGE,                            true, false, false, false, false),
];

/// Dynamic privileges are server-wide only and are not part of `ALL`.
pub static DYNAMIC_PRIVILEGES: &[&str] = &[
    "APPLICATION_PASSWORD_ADMIN",
    "AUDIT_ABORT_EXEMPT",
    "AUDIT_ADMIN",
    "AUTHENTICATION_POLICY_ADMIN",
    "BACKUP_ADMIN",
    "BINLOG_ADMIN",
    "BINLOG_ENCRYPTION_ADMIN",
    "CLONE_ADMIN",
    "CONNECTION_ADMIN",
    "ENCRYPTION_KEY_ADMIN",
    "FIREWALL_ADMIN",
    "FIREWALL_EXEMPT",
    "FIREWALL_USER",
    "FLUSH_OPTIMIZER_COSTS",
    "FLUSH_STATUS",
    "FLUSH_TABLES",
    "FLUSH_USER_RESOURCES",
    "GROUP_REPLICATION_ADMIN",
    "GROUP_REPLICATION_STREAM",
    "INNODB_REDO_LOG_ARCHIVE",
    "INNODB_REDO_LOG_ENABLE",
    "NDB_STORED_USER",
    "PASSWORDLESS_USER_ADMIN",
    "PERSIST_RO_VARIABLES_ADMIN",
    "REPLICATION_APPLIER",
    "REPLICATION_SLAVE_ADMIN",
    "RESOURCE_GROUP_ADMIN",
    "RESOURCE_GROUP_USER",
    "ROLE_ADMIN",
    "SENSITIVE_VARIABLES_OBSERVER",
    "SERVICE_CONNECTION_ADMIN",
    "SESSION_VARIABLES_ADMIN",
    "SET_USER_ID",
    "SHOW_ROUTINE",
    "SKIP_QUERY_REWRITE",
    "SYSTEM_USER",
    "SYSTEM_VARIABLES_ADMIN",
    "TABLE_ENCRYPTION_ADMIN",
    "TELEMETRY_LOG_ADMIN",
    "TP_CONNECTION_ADMIN",
    "VERSION_TOKEN_ADMIN",
    "XA_RECOVER_ADMIN",
];

/// System schemas whose privileges grants cannot meaningfully change.
pub static BUILTIN_DATABASES: &[&str] = &["information_schema", "performance_schema", "sys", "mysql"];

pub fn lookup(name: &str) -> Option<&'static PrivilegeDef> {
    STATIC_PRIVILEGES.iter().find(|p| p.name == name)
}

pub fn is_dynamic(name: &str) -> bool {
    DYNAMIC_PRIVILEGES.contains(&name)
}

pub fn is_builtin_database(name: &str) -> bool {
    BUILTIN_DATABASES
        .iter()
        .any(|db| db.eq_ignore_ascii_case(name))
}

pub fn is_all(name: &str) -> bool {
    name == "ALL" || name == "ALL PRIVILEGES"
}

/// What `ALL` expands to at one level.
pub fn all_at(level: Level) -> impl Iterator<Item = &'static str> {
    STATIC_PRIVILEGES
        .iter()
        .filter(move |p| p.scope.allows(level))
        .map(|p| p.name)
        .filter(|name| *name != USAGE && *name != GRANT_OPTION)
}

/// Every privilege a resource at this level can carry.
pub fn vocabulary(level: Level) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = STATIC_PRIVILEGES
        .iter()
        .filter(|p| p.scope.allows(level) && p.name != USAGE)
        .map(|p| p.name)
        .collect();
    if level == Level::Global {
        names.extend(DYNAMIC_PRIVILEGES.iter().copied());
    }
    names
}
