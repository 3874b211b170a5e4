use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Platform accounts. coin_balance is only mutated via atomic
        -- increments (UPDATE ... SET coin_balance = coin_balance + ?).
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            coin_balance INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        -- Coin ledger. Insert-only. The UNIQUE idempotency_key is the
        -- duplicate-delivery backstop: a second delivery of the same logical
        -- event hits the constraint instead of double-crediting.
        CREATE TABLE IF NOT EXISTS ledger_transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            amount INTEGER NOT NULL,
            action TEXT NOT NULL CHECK (action IN (
                'purchase', 'subscription_grant', 'subscription_renewal', 'affiliate_commission'
            )),
            metadata TEXT,
            idempotency_key TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_transactions(user_id);

        -- Tier config: tier name -> monthly coin allotment. Read-only here.
        CREATE TABLE IF NOT EXISTS subscription_tiers (
            tier TEXT PRIMARY KEY,
            monthly_coins INTEGER NOT NULL
        );

        -- Brand subscriptions. One row per user.
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
            tier TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active', 'past_due', 'paused')),
            stripe_subscription_id TEXT,
            stripe_customer_id TEXT,
            billing_cycle TEXT,
            current_period_end INTEGER,
            coins_granted_at INTEGER,
            verified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_stripe ON subscriptions(stripe_subscription_id);

        -- Referring models (for ticket commissions and shop affiliate codes).
        CREATE TABLE IF NOT EXISTS models (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            stage_name TEXT NOT NULL,
            commission_rate REAL NOT NULL DEFAULT 0.0,
            created_at INTEGER NOT NULL
        );

        -- Ticketed events and their purchases.
        CREATE TABLE IF NOT EXISTS ticket_purchases (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            buyer_name TEXT,
            buyer_email TEXT,
            tier TEXT,
            quantity INTEGER NOT NULL DEFAULT 1,
            unit_price_cents INTEGER NOT NULL DEFAULT 0,
            total_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'completed', 'cancelled')),
            checkout_session_id TEXT,
            referrer_model_id TEXT REFERENCES models(id),
            commission_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ticket_purchases_session ON ticket_purchases(checkout_session_id);

        -- Commissions: at most one per originating purchase.
        CREATE TABLE IF NOT EXISTS commissions (
            id TEXT PRIMARY KEY,
            model_id TEXT NOT NULL REFERENCES models(id),
            purchase_id TEXT NOT NULL UNIQUE,
            sale_cents INTEGER NOT NULL,
            rate REAL NOT NULL,
            amount_cents INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Workshops and registrations.
        CREATE TABLE IF NOT EXISTS workshops (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            price_cents INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workshop_registrations (
            id TEXT PRIMARY KEY,
            workshop_id TEXT NOT NULL,
            attendee_name TEXT,
            attendee_email TEXT,
            payment_plan TEXT NOT NULL DEFAULT 'full' CHECK (payment_plan IN ('full', 'installment_3')),
            total_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'completed', 'cancelled')),
            checkout_session_id TEXT,
            stripe_customer_id TEXT,
            installments_paid INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_workshop_regs_session ON workshop_registrations(checkout_session_id);

        -- Installment schedule: 3 dated obligations per installment-plan
        -- registration. Entries sum to the registration total.
        CREATE TABLE IF NOT EXISTS workshop_installments (
            id TEXT PRIMARY KEY,
            registration_id TEXT NOT NULL REFERENCES workshop_registrations(id),
            installment_number INTEGER NOT NULL,
            amount_cents INTEGER NOT NULL,
            due_date INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid')),
            retry_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(registration_id, installment_number)
        );

        -- Trip listings track capacity; applications reference them.
        CREATE TABLE IF NOT EXISTS trips (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            spots_total INTEGER NOT NULL DEFAULT 0,
            spots_filled INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trip_applications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            listing_id TEXT NOT NULL REFERENCES trips(id),
            payment_status TEXT NOT NULL DEFAULT 'pending' CHECK (payment_status IN ('pending', 'paid')),
            amount_paid_cents INTEGER NOT NULL DEFAULT 0,
            approved INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS creator_house_applications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            listing_id TEXT NOT NULL,
            payment_status TEXT NOT NULL DEFAULT 'pending' CHECK (payment_status IN ('pending', 'paid')),
            amount_paid_cents INTEGER NOT NULL DEFAULT 0,
            approved INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        -- Shop: products, orders, line items, affiliate attribution, carts.
        CREATE TABLE IF NOT EXISTS shop_products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price_cents INTEGER NOT NULL DEFAULT 0,
            total_sold INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS shop_orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid', 'cancelled')),
            total_cents INTEGER NOT NULL DEFAULT 0,
            checkout_session_id TEXT,
            payment_intent_id TEXT,
            charge_id TEXT,
            affiliate_code TEXT,
            commission_cents INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_shop_orders_session ON shop_orders(checkout_session_id);

        CREATE TABLE IF NOT EXISTS shop_order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES shop_orders(id),
            product_id TEXT NOT NULL REFERENCES shop_products(id),
            quantity INTEGER NOT NULL DEFAULT 1,
            unit_price_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid', 'cancelled'))
        );
        CREATE INDEX IF NOT EXISTS idx_shop_order_items_order ON shop_order_items(order_id);

        CREATE TABLE IF NOT EXISTS affiliate_codes (
            code TEXT PRIMARY KEY,
            model_id TEXT NOT NULL REFERENCES models(id),
            order_count INTEGER NOT NULL DEFAULT 0,
            total_earnings_cents INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS affiliate_earnings (
            id TEXT PRIMARY KEY,
            affiliate_code TEXT NOT NULL REFERENCES affiliate_codes(code),
            order_id TEXT NOT NULL UNIQUE,
            amount_cents INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'available', 'paid_out')),
            available_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cart_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_cart_items_user ON cart_items(user_id);

        -- Content-program enrollments.
        CREATE TABLE IF NOT EXISTS program_enrollments (
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'active', 'cancelled')),
            checkout_session_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_enrollments_session ON program_enrollments(checkout_session_id);

        -- Comp-card print orders.
        CREATE TABLE IF NOT EXISTS comp_card_orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending_payment' CHECK (status IN ('pending_payment', 'paid', 'cancelled')),
            total_cents INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
