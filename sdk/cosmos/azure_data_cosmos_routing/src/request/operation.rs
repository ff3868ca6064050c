// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

/// The kind of operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Create,
    Read,
    ReadFeed,
    Replace,
    Delete,
    Upsert,
    Patch,
    Query,
    SqlQuery,
    ExecuteJavaScript,
    Head,
    HeadFeed,
    Batch,
    GetSplitPoint,
    AbortSplit,
}

impl OperationType {
    /// Returns `true` if the operation mutates state on the service.
    pub fn is_write_operation(self) -> bool {
        matches!(
            self,
            OperationType::Create
                | OperationType::Replace
                | OperationType::Delete
                | OperationType::Upsert
                | OperationType::Patch
                | OperationType::ExecuteJavaScript
                | OperationType::Batch
        )
    }

    pub fn is_read_only_operation(self) -> bool {
        matches!(
            self,
            OperationType::Read
                | OperationType::ReadFeed
                | OperationType::Head
                | OperationType::HeadFeed
                | OperationType::Query
                | OperationType::SqlQuery
        )
    }

    pub fn is_feed_operation(self) -> bool {
        matches!(
            self,
            OperationType::ReadFeed
                | OperationType::Query
                | OperationType::SqlQuery
                | OperationType::HeadFeed
        )
    }
}

/// The kind of resource a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    DatabaseAccount,
    Database,
    DocumentCollection,
    Document,
    Attachment,
    Conflict,
    Schema,
    StoredProcedure,
    Trigger,
    UserDefinedFunction,
    User,
    UserDefinedType,
    Permission,
    Offer,
    PartitionKeyRange,
    Topology,
}

impl ResourceType {
    /// Server-side scripts: stored procedures, triggers and user-defined functions.
    pub fn is_script(self) -> bool {
        matches!(
            self,
            ResourceType::StoredProcedure
                | ResourceType::Trigger
                | ResourceType::UserDefinedFunction
        )
    }

    /// Returns `true` for resources that live inside a collection.
    pub fn is_collection_child(self) -> bool {
        self.is_script()
            || matches!(
                self,
                ResourceType::Document
                    | ResourceType::Attachment
                    | ResourceType::Conflict
                    | ResourceType::Schema
            )
    }

    /// Returns `true` for resources stored in the account's master partition.
    pub fn is_master_resource(self) -> bool {
        matches!(
            self,
            ResourceType::DatabaseAccount
                | ResourceType::Database
                | ResourceType::DocumentCollection
                | ResourceType::User
                | ResourceType::UserDefinedType
                | ResourceType::Permission
                | ResourceType::Offer
                | ResourceType::Topology
                | ResourceType::PartitionKeyRange
        )
    }
}
