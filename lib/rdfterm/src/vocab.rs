//! IRI constants of the vocabularies the query engine relies on, as [`NamedNodeRef`](super::NamedNodeRef)s.

macro_rules! vocabulary {
    ($namespace:literal { $($(#[$doc:meta])* $name:ident = $local:literal,)* }) => {
        use crate::named_node::NamedNodeRef;

        /// The namespace all the constants of this module share.
        pub const NAMESPACE: &str = $namespace;

        $(
            $(#[$doc])*
            pub const $name: NamedNodeRef<'static> =
                NamedNodeRef::new_unchecked(concat!($namespace, $local));
        )*
    };
}

pub mod rdf {
    //! Terms of the [RDF](https://www.w3.org/TR/rdf11-concepts/) namespace.

    vocabulary!("http://www.w3.org/1999/02/22-rdf-syntax-ns#" {
        /// Datatype of language-tagged strings.
        LANG_STRING = "langString",
        TYPE = "type",
    });
}

pub mod xsd {
    //! [XML Schema](https://www.w3.org/TR/xmlschema11-2/) datatypes with a SPARQL operator mapping.

    vocabulary!("http://www.w3.org/2001/XMLSchema#" {
        BOOLEAN = "boolean",
        DATE = "date",
        DATE_TIME = "dateTime",
        /// Durations without a year or month component.
        DAY_TIME_DURATION = "dayTimeDuration",
        DECIMAL = "decimal",
        DOUBLE = "double",
        DURATION = "duration",
        FLOAT = "float",
        G_DAY = "gDay",
        G_MONTH = "gMonth",
        G_MONTH_DAY = "gMonthDay",
        G_YEAR = "gYear",
        G_YEAR_MONTH = "gYearMonth",
        /// Derived from `xsd:integer`, read as an integer.
        INT = "int",
        INTEGER = "integer",
        /// Datatype of simple literals.
        STRING = "string",
        TIME = "time",
        /// Durations without a day or time component.
        YEAR_MONTH_DURATION = "yearMonthDuration",
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_in_their_namespace() {
        assert_eq!(
            xsd::DAY_TIME_DURATION.as_str(),
            "http://www.w3.org/2001/XMLSchema#dayTimeDuration"
        );
        assert!(rdf::LANG_STRING.as_str().starts_with(rdf::NAMESPACE));
    }
}
