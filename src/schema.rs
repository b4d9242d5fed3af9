// Mirrors the DDL in `store::SCHEMA_SQL`.

diesel::table! {
    businesses (id) {
        id -> Integer,
        name -> Text,
        business_type -> Text,
        contact_email -> Nullable<Text>,
        is_active -> Bool,
    }
}

diesel::table! {
    business_intents (id) {
        id -> Integer,
        business_type -> Text,
        intent_name -> Text,
        response_text -> Text,
        training_examples -> Text,
        priority -> Integer,
        is_active -> Bool,
    }
}

diesel::table! {
    bot_configs (id) {
        id -> Integer,
        business_type -> Text,
        default_greeting -> Text,
        default_fallback -> Text,
        enable_voice_support -> Bool,
        enable_multilingual -> Bool,
        enable_llm_fallback -> Bool,
    }
}

diesel::table! {
    admin_users (id) {
        id -> Integer,
        name -> Text,
        email -> Text,
        password_hash -> Text,
        is_admin -> Bool,
        business_id -> Nullable<Integer>,
    }
}

diesel::table! {
    chatbot_logs (id) {
        id -> Integer,
        business_id -> Nullable<Integer>,
        user_message -> Text,
        bot_response -> Text,
        intent_detected -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::joinable!(admin_users -> businesses (business_id));
diesel::joinable!(chatbot_logs -> businesses (business_id));

diesel::allow_tables_to_appear_in_same_query!(
    admin_users,
    bot_configs,
    business_intents,
    businesses,
    chatbot_logs,
);
