diesel::table! {
    equipment (id) {
        id -> Uuid,
        owner_id -> Uuid,
        name -> Varchar,
        category -> Nullable<Varchar>,
        description -> Nullable<Text>,
        daily_rate -> Int8,
        available -> Bool,
        specs -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        equipment_id -> Uuid,
        renter_id -> Uuid,
        start_date -> Timestamptz,
        end_date -> Timestamptz,
        total_price -> Int8,
        status -> Varchar,
        payment_order_ref -> Nullable<Varchar>,
        payment_ref -> Nullable<Varchar>,
        rated -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reviews (id) {
        id -> Uuid,
        renter_id -> Uuid,
        equipment_id -> Uuid,
        rating -> Int4,
        comment -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    payment_receipts (id) {
        id -> Uuid,
        booking_id -> Uuid,
        payment_ref -> Varchar,
        amount -> Int8,
        currency -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(bookings -> equipment (equipment_id));
diesel::joinable!(reviews -> equipment (equipment_id));
diesel::joinable!(payment_receipts -> bookings (booking_id));

diesel::allow_tables_to_appear_in_same_query!(equipment, bookings, reviews, payment_receipts);
