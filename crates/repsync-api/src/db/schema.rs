diesel::table! {
    use diesel::sql_types::*;

    events (event_id) {
        event_id -> Uuid,
        event_type -> Varchar,
        payload -> Jsonb,
        user_id -> Uuid,
        device_id -> Uuid,
        sequence_number -> Int8,
        correlation_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    workouts_projection (workout_id) {
        workout_id -> Uuid,
        user_id -> Uuid,
        started_at -> Timestamptz,
        ended_at -> Nullable<Timestamptz>,
        status -> Varchar,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    sets_projection (set_id) {
        set_id -> Uuid,
        workout_id -> Uuid,
        exercise_id -> Uuid,
        reps -> Int4,
        weight -> Float8,
        completed_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(events, workouts_projection, sets_projection,);
