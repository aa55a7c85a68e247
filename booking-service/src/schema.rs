diesel::table! {
    slot_cells (id) {
        id -> Uuid,
        slot_id -> Uuid,
        slot_date -> Date,
        sub_slot -> Varchar,
        capacity -> Int4,
        booked -> Int4,
        held -> Int4,
        price -> Numeric,
        active -> Bool,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    seat_holds (booking_id) {
        booking_id -> Uuid,
        slot_id -> Uuid,
        slot_date -> Date,
        sub_slot -> Varchar,
        seats -> Int4,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        user_id -> Uuid,
        event_id -> Uuid,
        slot_id -> Uuid,
        slot_date -> Date,
        sub_slot -> Varchar,
        seats -> Int4,
        unit_price -> Numeric,
        total_price -> Numeric,
        booking_status -> Varchar,
        payment_status -> Varchar,
        payment_reference -> Nullable<Varchar>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(slot_cells, seat_holds, bookings,);
