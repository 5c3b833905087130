use sea_query::Iden;

#[derive(Iden)]
pub enum Assets {
    Table,
    Id,
    FilePath,
    MimeType,
    RegisteredAt,
}

#[derive(Iden)]
pub enum AssetMeta {
    Table,
    AssetId,
    Key,
    Value,
}

#[derive(Iden)]
pub enum LibraryConfig {
    Table,
    Key,
    Value,
}

#[derive(Iden)]
pub enum AuditLog {
    Table,
    Id,
    Timestamp,
    Operation,
    AssetId,
    User,
    Detail,
}
