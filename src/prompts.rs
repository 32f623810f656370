//! Prompt templates and response schemas for the LLM calls.

use serde_json::{json, Value};

use crate::llm::Prompt;

pub const RELEVANCE_SYSTEM: &str = "You are a smart shopping assistant that determines if a query \
is relevant for finding groceries or medicines.";

/// Is this query something the catalog could answer?
pub fn relevance(query: &str) -> Prompt {
    Prompt::with_system(
        RELEVANCE_SYSTEM,
        format!(
            "Determine if the following query is relevant for finding items. \
             Answer with is_relevant true or false. Query: {}",
            query
        ),
    )
}

pub fn relevance_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "is_relevant": {
                "type": "BOOLEAN",
                "description": "Whether the query is relevant for finding items"
            }
        },
        "required": ["is_relevant"]
    })
}

/// Shopping intent extraction.
pub fn extraction(query: &str) -> Prompt {
    Prompt::user(format!(
        "Extract the following information from the user's query:\n\
         - List of items (e.g., product names)\n\
         - Preferred brand (if mentioned)\n\
         - Preferred delivery time (in days, if specified)\n\
         - Category (e.g., dairy, medicine, beverages)\n\
         - Quantity (if specified)\n\
         \n\
         Query: {}\n\
         \n\
         Convert the extracted information into lowercase and return it in the specified format.",
        query
    ))
}

pub fn extraction_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "items": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "List of item names or identifiers"
            },
            "preferred_brand": {
                "type": "STRING",
                "nullable": true,
                "description": "Preferred brand for the items"
            },
            "delivery_time": {
                "type": "INTEGER",
                "nullable": true,
                "description": "Delivery time in days, if specified"
            },
            "category": {
                "type": "STRING",
                "nullable": true,
                "description": "Item category, if specified"
            },
            "quantity": {
                "type": "INTEGER",
                "nullable": true,
                "description": "Quantity of items, if specified"
            }
        },
        "required": ["items"]
    })
}

/// Fields interpolated into the provider notification email.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEmailFields<'a> {
    pub order_id: &'a str,
    pub customer_name: &'a str,
    pub items: &'a str,
    pub total: f64,
    pub delivery_address: &'a str,
}

pub fn order_email(fields: &OrderEmailFields<'_>) -> Prompt {
    Prompt::user(format!(
        "Write a friendly order notification email for a provider regarding an order for \
         customer '{}'. Order ID: {}. Items: {}. Total: {:.2}. Delivery Address: {}. \
         Return only the email body.",
        fields.customer_name, fields.order_id, fields.items, fields.total, fields.delivery_address
    ))
}
