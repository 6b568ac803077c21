#[macro_export]
macro_rules! value_tag_registry_entries {
    ($macro:ident $(, @args $($args:tt)+ )?) => {
        $macro! {
            $(
                @args $($args)+;
            )?
            @entries
            (
                Null,
                code = 0x01,
                label = "null",
                payload = None
            ),
            (
                Int64,
                code = 0x0C,
                label = "int64",
                payload = VarInt
            ),
            (
                Boolean,
                code = 0x17,
                label = "boolean",
                payload = None
            ),
            (
                String,
                code = 0x1B,
                label = "string",
                payload = Terminated
            ),
            (
                Double,
                code = 0x1E,
                label = "double",
                payload = Fixed(8)
            ),
            (
                Point,
                code = 0x21,
                label = "point",
                payload = Fixed(16)
            ),
            (
                User,
                code = 0x24,
                label = "user",
                payload = Compound
            ),
            (
                Reference,
                code = 0x27,
                label = "reference",
                payload = Compound
            ),
        }
    };
}

#[macro_export]
macro_rules! value_tag_registry {
    ($macro:ident) => {
        $crate::value_tag_registry_entries!($macro)
    };
    ($macro:ident, $($args:tt)+) => {
        $crate::value_tag_registry_entries!($macro, @args $($args)+)
    };
}

macro_rules! metadata_from_registry {
    ( @args $tag:expr; @entries $( ($variant:ident, code = $code:expr, label = $label:expr, payload = $payload:ident $(($width:expr))?) ),* $(,)? ) => {
        match $tag {
            $(
                $crate::ValueTag::$variant => $crate::TagMetadata {
                    code: $code,
                    label: $label,
                    payload: $crate::PayloadShape::$payload $(($width))?,
                },
            )*
        }
    };
}

macro_rules! all_tags_from_registry {
    ( @entries $( ($variant:ident, code = $code:expr, label = $label:expr, payload = $payload:ident $(($width:expr))?) ),* $(,)? ) => {
        [ $( $crate::ValueTag::$variant ),* ]
    };
}
