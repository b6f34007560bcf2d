// Diesel table definitions, kept in sync with the DDL in schema.rs

diesel::table! {
    schema_version (version) {
        version -> Integer,
    }
}

diesel::table! {
    lives (id) {
        id -> Text,
        display_name -> Text,
        email -> Text,
        billing_customer_id -> Nullable<Text>,
        registered -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    karma_ledger (id) {
        id -> Text,
        life_id -> Text,
        affected_id -> Nullable<Text>,
        interaction_id -> Nullable<Text>,
        positive_delta -> Integer,
        negative_delta -> Integer,
        note -> Nullable<Text>,
        recorded_at -> Text,
    }
}

diesel::table! {
    chakra_profiles (id) {
        id -> Text,
        life_id -> Text,
        chakra -> Text,
        opened_by_json -> Text,
        closed_by_json -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    karma_interactions (id) {
        id -> Text,
        influencer_id -> Text,
        affected_id -> Text,
        chakra -> Text,
        direction -> Text,
        original_direction -> Text,
        positive_accrued -> Integer,
        negative_accrued -> Integer,
        status -> Text,
        created_at -> Text,
        last_accrued_at -> Text,
        last_reminded_at -> Nullable<Text>,
    }
}

diesel::joinable!(karma_ledger -> lives (life_id));
diesel::joinable!(chakra_profiles -> lives (life_id));

diesel::allow_tables_to_appear_in_same_query!(
    lives,
    karma_ledger,
    chakra_profiles,
    karma_interactions,
);
