//! Create post_vote and comment_vote tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PostVote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PostVote::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PostVote::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(PostVote::PostId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(PostVote::VoteType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostVote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_post_vote_user")
                            .from(PostVote::Table, PostVote::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_post_vote_post")
                            .from(PostVote::Table, PostVote::PostId)
                            .to(Post::Table, Post::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (user_id, post_id) - one vote per user per post
        manager
            .create_index(
                Index::create()
                    .name("idx_post_vote_user_post")
                    .table(PostVote::Table)
                    .col(PostVote::UserId)
                    .col(PostVote::PostId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: post_id (for the tally recount)
        manager
            .create_index(
                Index::create()
                    .name("idx_post_vote_post_id")
                    .table(PostVote::Table)
                    .col(PostVote::PostId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CommentVote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CommentVote::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CommentVote::UserId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CommentVote::CommentId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CommentVote::VoteType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CommentVote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comment_vote_user")
                            .from(CommentVote::Table, CommentVote::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comment_vote_comment")
                            .from(CommentVote::Table, CommentVote::CommentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (user_id, comment_id) - one vote per user per comment
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_vote_user_comment")
                    .table(CommentVote::Table)
                    .col(CommentVote::UserId)
                    .col(CommentVote::CommentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: comment_id (for the tally recount)
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_vote_comment_id")
                    .table(CommentVote::Table)
                    .col(CommentVote::CommentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommentVote::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PostVote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PostVote {
    Table,
    Id,
    UserId,
    PostId,
    VoteType,
    CreatedAt,
}

#[derive(Iden)]
enum CommentVote {
    Table,
    Id,
    UserId,
    CommentId,
    VoteType,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}

#[derive(Iden)]
enum Post {
    Table,
    Id,
}

#[derive(Iden)]
enum Comment {
    Table,
    Id,
}
